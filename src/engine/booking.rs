use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::{BookingEvent, DateRange, Event, Hotel, Reservation, RoomState};
use crate::observability;
use crate::pricing::{self, Tier};

use super::{BookingError, Engine, apply_to_room};

/// One booking attempt. Dates arrive unvalidated from the caller; tier is
/// whatever the auth collaborator derived for this request.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tier: Tier,
}

impl Engine {
    /// Seed a hotel. No update or delete — hotel administration is a
    /// collaborator concern; the store only needs location and the room set.
    pub async fn add_hotel(&self, name: String, location: String) -> Result<Hotel, BookingError> {
        let hotel = Hotel {
            id: Ulid::new(),
            name,
            location,
        };
        let event = Event::HotelAdded {
            id: hotel.id,
            name: hotel.name.clone(),
            location: hotel.location.clone(),
        };
        self.wal_append(&event).await?;
        self.hotels.insert(hotel.id, hotel.clone());
        Ok(hotel)
    }

    /// Seed a room under an existing hotel.
    pub async fn add_room(
        &self,
        hotel_id: Ulid,
        room_number: String,
        capacity: u32,
        rate: Decimal,
    ) -> Result<Ulid, BookingError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(BookingError::HotelNotFound(hotel_id));
        }
        let id = Ulid::new();
        let event = Event::RoomAdded {
            id,
            hotel_id,
            room_number: room_number.clone(),
            capacity,
            rate,
        };
        self.wal_append(&event).await?;
        let room = RoomState::new(id, hotel_id, room_number, capacity, rate);
        self.rooms.insert(id, std::sync::Arc::new(RwLock::new(room)));
        self.rooms_by_hotel.entry(hotel_id).or_default().push(id);
        Ok(id)
    }

    /// Create a reservation, atomically with respect to every other booking
    /// attempt on the same room.
    ///
    /// The room's write lock is held from the availability check through the
    /// WAL fsync and the in-memory apply, so two overlapping requests for one
    /// room serialize: the loser observes the winner's reservation and fails
    /// with `RoomUnavailable`. A WAL failure releases the lock with nothing
    /// applied — no partial reservation is ever visible.
    ///
    /// The post-commit event publish is a separate phase: it retries
    /// transient sink failures with backoff and, if it still fails, logs a
    /// warning and leaves the booking committed.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Reservation, BookingError> {
        let started = std::time::Instant::now();
        let result = self.create_booking_inner(req).await;
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "status" => observability::booking_status_label(&result),
        )
        .increment(1);
        result
    }

    async fn create_booking_inner(&self, req: BookingRequest) -> Result<Reservation, BookingError> {
        let range = DateRange::new(req.start, req.end)?;

        let room = self
            .room(&req.room_id)
            .ok_or(BookingError::RoomNotFound(req.room_id))?;

        // Advisory lock on the room. Bounded wait: a timeout rolls back
        // cleanly with nothing held and nothing written.
        let mut guard = tokio::time::timeout(self.config.lock_timeout, room.write_owned())
            .await
            .map_err(|_| BookingError::Timeout)?;

        if let Some(conflict) = guard.first_conflict(&range) {
            return Err(BookingError::RoomUnavailable(conflict.id));
        }

        let total_price = pricing::quote(guard.rate, &range, req.tier);
        let reservation = Reservation {
            id: Ulid::new(),
            room_id: req.room_id,
            user_id: req.user_id,
            range,
            total_price,
            created_at: Utc::now(),
        };

        let event = Event::ReservationCreated {
            id: reservation.id,
            room_id: reservation.room_id,
            user_id: reservation.user_id,
            range: reservation.range,
            total_price: reservation.total_price,
            created_at: reservation.created_at,
        };
        // Commit point: fsynced before anything becomes visible.
        self.wal_append(&event).await?;
        apply_to_room(&mut guard, &event);
        drop(guard);

        self.publish_with_retry(BookingEvent::from(&reservation))
            .await;

        Ok(reservation)
    }

    /// Phase 2 of a booking: durable handoff to the event sink. Best-effort —
    /// the reservation is already committed and stays valid whatever happens
    /// here.
    async fn publish_with_retry(&self, event: BookingEvent) {
        let policy = &self.config.publish_retry;
        for attempt in 0..=policy.max_retries {
            match self.sink.publish(&event).await {
                Ok(()) => {
                    metrics::counter!(observability::EVENTS_PUBLISHED_TOTAL).increment(1);
                    return;
                }
                Err(e) if attempt < policy.max_retries => {
                    metrics::counter!(observability::EVENT_PUBLISH_RETRIES_TOTAL).increment(1);
                    tracing::debug!(
                        reservation = %event.reservation_id,
                        "publish attempt {attempt} failed, retrying: {e}"
                    );
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
                Err(e) => {
                    metrics::counter!(observability::EVENT_PUBLISH_FAILURES_TOTAL).increment(1);
                    tracing::warn!(
                        reservation = %event.reservation_id,
                        "booking committed but notification publish failed after {} attempts: {e}",
                        policy.max_retries + 1,
                    );
                }
            }
        }
    }
}
