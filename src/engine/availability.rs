use ulid::Ulid;

use crate::model::{DateRange, Hotel, RoomOffer};
use crate::pricing::{self, Tier};

use super::{BookingError, Engine};

/// Read-only availability paths. These take plain read locks: a stale answer
/// only costs the caller a booking-time `RoomUnavailable` later, never a
/// double booking. The authoritative check runs under the room's write lock
/// inside `create_booking`.
impl Engine {
    /// Whether `room_id` has no committed reservation overlapping `range`.
    pub async fn is_available(
        &self,
        room_id: Ulid,
        range: &DateRange,
    ) -> Result<bool, BookingError> {
        let room = self
            .room(&room_id)
            .ok_or(BookingError::RoomNotFound(room_id))?;
        let guard = room.read().await;
        Ok(guard.is_free(range))
    }

    /// Ids of the hotel's rooms free for the whole of `range`.
    pub async fn list_available(
        &self,
        hotel_id: Ulid,
        range: &DateRange,
    ) -> Result<Vec<Ulid>, BookingError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(BookingError::HotelNotFound(hotel_id));
        }
        let room_ids = self
            .rooms_by_hotel
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut free = Vec::new();
        for id in room_ids {
            if let Some(room) = self.room(&id) {
                let guard = room.read().await;
                if guard.is_free(range) {
                    free.push(id);
                }
            }
        }
        Ok(free)
    }

    /// Free rooms matching a destination search: hotel location contains
    /// `destination` (case-insensitive), room sleeps at least `min_capacity`,
    /// no reservation overlaps `range`. Display rates carry the caller's tier
    /// discount, mirroring what a logged-in searcher is quoted.
    pub async fn search(
        &self,
        destination: &str,
        range: &DateRange,
        min_capacity: u32,
        tier: Tier,
    ) -> Vec<RoomOffer> {
        let needle = destination.to_lowercase();

        // Snapshot matching hotels before touching any room lock: holding a
        // map shard guard across an await would block writers on that shard.
        let hotels: Vec<Hotel> = self
            .hotels
            .iter()
            .filter(|h| h.location.to_lowercase().contains(&needle))
            .map(|e| e.value().clone())
            .collect();

        let mut offers = Vec::new();
        for hotel in hotels {
            let room_ids = self
                .rooms_by_hotel
                .get(&hotel.id)
                .map(|e| e.value().clone())
                .unwrap_or_default();

            for id in room_ids {
                let Some(room) = self.room(&id) else { continue };
                let guard = room.read().await;
                if guard.capacity < min_capacity || !guard.is_free(range) {
                    continue;
                }
                offers.push(RoomOffer {
                    room_id: id,
                    hotel_id: hotel.id,
                    hotel_name: hotel.name.clone(),
                    room_number: guard.room_number.clone(),
                    capacity: guard.capacity,
                    nightly_rate: pricing::display_rate(guard.rate, tier),
                    discount_applied: tier == Tier::Discounted,
                });
            }
        }
        offers
    }
}
