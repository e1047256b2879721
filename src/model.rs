use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Rejected range where `start >= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid range: start {start} must be before end {end}")]
pub struct InvalidRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Half-open calendar-date range `[start, end)`.
///
/// Check-in on `start`, check-out on `end`; the check-out day itself is free,
/// so a range ending on a date never overlaps one starting on that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidRange> {
        if start >= end {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whole nights covered. Always >= 1 for a constructed range; calendar
    /// subtraction counts days exactly (leap days are ordinary days).
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_date(&self, d: NaiveDate) -> bool {
        self.start <= d && d < self.end
    }
}

/// Hotel metadata needed by the search and availability paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
    pub location: String,
}

/// A committed reservation. Created only by the booking engine, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub range: DateRange,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of a committed reservation, handed to the event sink
/// exactly once per successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub reservation_id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub range: DateRange,
    pub total_price: Decimal,
}

impl From<&Reservation> for BookingEvent {
    fn from(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id,
            room_id: r.room_id,
            user_id: r.user_id,
            range: r.range,
            total_price: r.total_price,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub room_number: String,
    pub capacity: u32,
    /// Nightly rate before any tier discount.
    pub rate: Decimal,
    /// All committed reservations, sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(id: Ulid, hotel_id: Ulid, room_number: String, capacity: u32, rate: Decimal) -> Self {
        Self {
            id,
            hotel_id,
            room_number,
            capacity,
            rate,
            reservations: Vec::new(),
        }
    }

    /// Insert a reservation maintaining sort order by range start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start(), |r| r.range.start())
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Return only reservations whose range overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start() < query.end());
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end() > query.start())
    }

    /// First committed reservation conflicting with `query`, if any.
    pub fn first_conflict(&self, query: &DateRange) -> Option<&Reservation> {
        self.overlapping(query).next()
    }

    pub fn is_free(&self, query: &DateRange) -> bool {
        self.first_conflict(query).is_none()
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelAdded {
        id: Ulid,
        name: String,
        location: String,
    },
    RoomAdded {
        id: Ulid,
        hotel_id: Ulid,
        room_number: String,
        capacity: u32,
        rate: Decimal,
    },
    ReservationCreated {
        id: Ulid,
        room_id: Ulid,
        user_id: Ulid,
        range: DateRange,
        total_price: Decimal,
        created_at: DateTime<Utc>,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One search hit: a free room with its tier-adjusted display rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOffer {
    pub room_id: Ulid,
    pub hotel_id: Ulid,
    pub hotel_name: String,
    pub room_number: String,
    pub capacity: u32,
    pub nightly_rate: Decimal,
    pub discount_applied: bool,
}
