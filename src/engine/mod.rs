mod availability;
mod booking;
mod error;
mod queries;

pub use booking::BookingRequest;
pub use error::BookingError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::{Event, Hotel, RoomState};
use crate::outbox::{EventSink, RetryPolicy};
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal<Event>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(WalCommand::Append { event, response }) = rx.recv().await {
        let mut batch = vec![(event, response)];

        // Drain all immediately available appends
        while let Ok(WalCommand::Append { event, response }) = rx.try_recv() {
            batch.push((event, response));
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &mut batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(&mut batch, &result);
    }
}

fn flush_batch(
    wal: &mut Wal<Event>,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Engine tunables, all overridable from the environment in `main`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a booking attempt may wait for a room's write lock before it
    /// rolls back with `Timeout`.
    pub lock_timeout: Duration,
    /// Backoff schedule for the post-commit event publish.
    pub publish_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            publish_retry: RetryPolicy::default(),
        }
    }
}

/// The reservation store and booking transaction engine.
///
/// Each room's state lives behind its own `RwLock`; holding the write lock
/// across the availability check and the WAL append is the advisory lock that
/// makes check-then-insert indivisible per room. The WAL fsync ack is the
/// commit point: an append failure releases the lock with nothing applied.
pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) hotels: DashMap<Ulid, Hotel>,
    /// Hotel → rooms index for O(1) lookups on the availability paths.
    pub(super) rooms_by_hotel: DashMap<Ulid, Vec<Ulid>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) sink: Arc<dyn EventSink>,
    pub(super) config: EngineConfig,
}

/// Apply a committed event to the room holding it (no locking — caller holds
/// the write lock, or is the sole owner during replay).
fn apply_to_room(room: &mut RoomState, event: &Event) {
    if let Event::ReservationCreated {
        id,
        room_id,
        user_id,
        range,
        total_price,
        created_at,
    } = event
    {
        room.insert_reservation(crate::model::Reservation {
            id: *id,
            room_id: *room_id,
            user_id: *user_id,
            range: *range,
            total_price: *total_price,
            created_at: *created_at,
        });
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::<Event>::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Replay into plain state first; rooms get their locks only once
        // replay is done and nothing else can observe them.
        let hotels = DashMap::new();
        let rooms_by_hotel: DashMap<Ulid, Vec<Ulid>> = DashMap::new();
        let mut replayed_rooms: std::collections::HashMap<Ulid, RoomState> =
            std::collections::HashMap::new();

        for event in &events {
            match event {
                Event::HotelAdded { id, name, location } => {
                    hotels.insert(
                        *id,
                        Hotel {
                            id: *id,
                            name: name.clone(),
                            location: location.clone(),
                        },
                    );
                }
                Event::RoomAdded {
                    id,
                    hotel_id,
                    room_number,
                    capacity,
                    rate,
                } => {
                    let room = RoomState::new(*id, *hotel_id, room_number.clone(), *capacity, *rate);
                    replayed_rooms.insert(*id, room);
                    rooms_by_hotel.entry(*hotel_id).or_default().push(*id);
                }
                other @ Event::ReservationCreated { room_id, .. } => {
                    if let Some(room) = replayed_rooms.get_mut(room_id) {
                        apply_to_room(room, other);
                    }
                }
            }
        }

        let rooms = DashMap::new();
        for (id, room) in replayed_rooms {
            rooms.insert(id, Arc::new(RwLock::new(room)));
        }

        Ok(Self {
            rooms,
            hotels,
            rooms_by_hotel,
            wal_tx,
            sink,
            config,
        })
    }

    /// Write event to WAL via the background group-commit writer. Resolving
    /// Ok means the event is fsynced to disk.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::Storage(e.to_string()))
    }

    pub fn room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn hotel(&self, id: &Ulid) -> Option<Hotel> {
        self.hotels.get(id).map(|e| e.value().clone())
    }
}
