use ulid::Ulid;

use crate::model::{DateRange, Hotel, Reservation};

use super::{BookingError, Engine};

impl Engine {
    pub fn list_hotels(&self) -> Vec<Hotel> {
        self.hotels.iter().map(|e| e.value().clone()).collect()
    }

    /// All reservations held by a user, newest stay first.
    pub async fn reservations_for_user(&self, user_id: Ulid) -> Vec<Reservation> {
        // Snapshot the room handles first: awaiting a room lock while inside
        // the map iterator would pin its shard guard across the suspension.
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for room in rooms {
            let guard = room.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.user_id == user_id)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| b.range.start().cmp(&a.range.start()));
        out
    }

    /// Percentage of the hotel's room-nights inside `window` that are booked.
    /// Reservations are clamped to the window so stays straddling its edges
    /// count only the nights inside. A hotel with no rooms reports 0.
    pub async fn occupancy_rate(
        &self,
        hotel_id: Ulid,
        window: &DateRange,
    ) -> Result<f64, BookingError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(BookingError::HotelNotFound(hotel_id));
        }
        let room_ids = self
            .rooms_by_hotel
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        if room_ids.is_empty() {
            return Ok(0.0);
        }

        let mut booked_nights: i64 = 0;
        for id in &room_ids {
            let Some(room) = self.room(id) else { continue };
            let guard = room.read().await;
            for r in guard.overlapping(window) {
                let start = r.range.start().max(window.start());
                let end = r.range.end().min(window.end());
                booked_nights += (end - start).num_days();
            }
        }

        let possible_nights = room_ids.len() as i64 * window.nights();
        Ok(booked_nights as f64 * 100.0 / possible_nights as f64)
    }
}
