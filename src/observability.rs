use std::net::SocketAddr;

use crate::engine::BookingError;
use crate::model::Reservation;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: status.
pub const BOOKINGS_TOTAL: &str = "lodge_bookings_total";

/// Histogram: create_booking latency in seconds, including the publish phase.
pub const BOOKING_DURATION_SECONDS: &str = "lodge_booking_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lodge_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lodge_wal_flush_batch_size";

/// Counter: booking events durably queued.
pub const EVENTS_PUBLISHED_TOTAL: &str = "lodge_events_published_total";

/// Counter: booking events handed to a consumer.
pub const EVENTS_DELIVERED_TOTAL: &str = "lodge_events_delivered_total";

/// Counter: transient publish failures that were retried.
pub const EVENT_PUBLISH_RETRIES_TOTAL: &str = "lodge_event_publish_retries_total";

/// Counter: publishes abandoned after exhausting retries (booking kept).
pub const EVENT_PUBLISH_FAILURES_TOTAL: &str = "lodge_event_publish_failures_total";

/// Gauge: events queued in the outbox awaiting delivery.
pub const OUTBOX_PENDING: &str = "lodge_outbox_pending";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a booking outcome to a short status label for metrics.
pub fn booking_status_label(result: &Result<Reservation, BookingError>) -> &'static str {
    match result {
        Ok(_) => "created",
        Err(BookingError::InvalidRange(_)) => "invalid_range",
        Err(BookingError::RoomNotFound(_)) => "room_not_found",
        Err(BookingError::HotelNotFound(_)) => "hotel_not_found",
        Err(BookingError::RoomUnavailable(_)) => "room_unavailable",
        Err(BookingError::Timeout) => "timeout",
        Err(BookingError::Transient(_)) => "transient",
        Err(BookingError::Storage(_)) => "storage",
    }
}
