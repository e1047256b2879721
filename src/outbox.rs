use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::model::BookingEvent;
use crate::wal::Wal;

/// The sink can only fail transiently; the engine retries with backoff and a
/// terminal failure degrades to a logged warning, never a failed booking.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transient sink failure: {0}")]
    Transient(String),
}

/// Collaborator boundary for booking notifications. `publish` returning Ok
/// means the event is durably queued (survives process restart); delivery to
/// consumers is at-least-once, so consumers must tolerate duplicates.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), SinkError>;
}

/// Backoff schedule for retrying a transient publish failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): initial_delay ×
    /// multiplier^attempt, capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(ms as u64);
        delay.min(self.max_delay)
    }
}

const CHANNEL_CAPACITY: usize = 256;

struct OutboxState {
    log: Wal<BookingEvent>,
    /// Number of events (from the start of the log) already delivered.
    acked: u64,
    /// In-memory tail of the log: everything past the ack cursor, oldest
    /// first. Loaded once at open, appended on publish — delivery never
    /// re-reads the file.
    queue: VecDeque<BookingEvent>,
}

/// Durable booking-event queue.
///
/// `publish` appends the event to a WAL-framed file and fsyncs before
/// returning, so an acknowledged publish survives restart. A persisted ack
/// cursor (sidecar file, atomically swapped) tracks how many events have been
/// delivered; everything past it is pending and will be redelivered after a
/// crash — at-least-once, never lost once published.
pub struct DurableOutbox {
    state: Mutex<OutboxState>,
    ack_path: PathBuf,
    consumers: broadcast::Sender<BookingEvent>,
}

impl DurableOutbox {
    pub fn open(path: &Path) -> io::Result<Self> {
        let ack_path = path.with_extension("ack");
        let acked = read_ack_cursor(&ack_path)?;
        let queue: VecDeque<BookingEvent> = Wal::<BookingEvent>::replay(path)?
            .into_iter()
            .skip(acked as usize)
            .collect();
        let log = Wal::open(path)?;
        let (consumers, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            state: Mutex::new(OutboxState { log, acked, queue }),
            ack_path,
            consumers,
        })
    }

    /// Subscribe to delivered events. Subscribers joining later miss nothing
    /// durable: the relay only acks what a subscriber actually received.
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.consumers.subscribe()
    }

    /// Events published but not yet acked, oldest first.
    pub async fn pending(&self) -> io::Result<Vec<BookingEvent>> {
        let state = self.state.lock().await;
        Ok(state.queue.iter().cloned().collect())
    }

    /// Mark the oldest `count` pending events as delivered and persist the
    /// cursor.
    pub async fn ack(&self, count: u64) -> io::Result<()> {
        let mut state = self.state.lock().await;
        Self::ack_locked(&mut state, &self.ack_path, count)
    }

    fn ack_locked(state: &mut OutboxState, ack_path: &Path, count: u64) -> io::Result<()> {
        state.queue.drain(..(count as usize).min(state.queue.len()));
        state.acked += count;
        write_ack_cursor(ack_path, state.acked)
    }

    /// Deliver pending events to in-process subscribers, acking each after a
    /// successful handoff. Returns the number delivered. With no subscribers
    /// nothing is acked, so events wait durably for a consumer.
    ///
    /// The state lock is held across the whole read-deliver-ack sequence so
    /// concurrent callers (the relay tick and the shutdown drain) cannot both
    /// claim the same events and double-advance the cursor.
    pub async fn deliver_pending(&self) -> io::Result<usize> {
        let mut state = self.state.lock().await;
        metrics::gauge!(crate::observability::OUTBOX_PENDING).set(state.queue.len() as f64);
        let mut delivered = 0usize;
        while let Some(event) = state.queue.front() {
            if self.consumers.send(event.clone()).is_err() {
                break; // no subscribers — keep the rest queued
            }
            state.queue.pop_front();
            delivered += 1;
        }
        if delivered > 0 {
            state.acked += delivered as u64;
            write_ack_cursor(&self.ack_path, state.acked)?;
            metrics::counter!(crate::observability::EVENTS_DELIVERED_TOTAL)
                .increment(delivered as u64);
        }
        Ok(delivered)
    }
}

#[async_trait]
impl EventSink for DurableOutbox {
    async fn publish(&self, event: &BookingEvent) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        state
            .log
            .append_buffered(event)
            .and_then(|()| state.log.flush_sync())
            .map_err(|e| SinkError::Transient(e.to_string()))?;
        state.queue.push_back(event.clone());
        Ok(())
    }
}

/// Relay loop: periodically drain the outbox to subscribers. A crash between
/// send and ack redelivers on restart, which consumers must tolerate.
pub async fn run_relay(outbox: Arc<DurableOutbox>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match outbox.deliver_pending().await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("relay delivered {n} booking events"),
            Err(e) => tracing::warn!("relay failed to read outbox: {e}"),
        }
    }
}

fn read_ack_cursor(path: &Path) -> io::Result<u64> {
    match fs::read_to_string(path) {
        Ok(s) => s
            .trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Atomic swap: write the cursor to a temp file and rename over the old one.
fn write_ack_cursor(path: &Path, acked: u64) -> io::Result<()> {
    let tmp = path.with_extension("ack.tmp");
    fs::write(&tmp, acked.to_string())?;
    fs::rename(&tmp, path)
}
