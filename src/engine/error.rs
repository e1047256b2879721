use ulid::Ulid;

use crate::model::InvalidRange;

/// Failure taxonomy for the booking core. The owning service layer maps these
/// to transport responses: `InvalidRange` → bad request, the not-found pair →
/// not found, `RoomUnavailable` → conflict, `Timeout`/`Transient` → retryable
/// server error, `Storage` → fatal server error.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),
    #[error("room not found: {0}")]
    RoomNotFound(Ulid),
    #[error("hotel not found: {0}")]
    HotelNotFound(Ulid),
    /// Business conflict, expected under contention. Carries the id of the
    /// reservation already holding overlapping dates.
    #[error("room not available for the selected dates (held by reservation {0})")]
    RoomUnavailable(Ulid),
    #[error("timed out waiting for room lock")]
    Timeout,
    #[error("transient failure: {0}")]
    Transient(String),
    /// WAL append or replay failure. Nothing was committed; surfaced, never
    /// retried automatically.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl BookingError {
    /// Whether the caller may safely retry the whole operation. Safe because
    /// a failed booking attempt commits nothing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Timeout | BookingError::Transient(_))
    }
}
