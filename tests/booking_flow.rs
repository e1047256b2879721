//! End-to-end booking flow: engine + durable outbox + relay, the same wiring
//! `main` sets up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use ulid::Ulid;

use lodge::engine::{BookingError, BookingRequest, Engine, EngineConfig};
use lodge::outbox::{DurableOutbox, run_relay};
use lodge::pricing::Tier;

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("lodge_test_flow").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn request(room_id: Ulid, start: &str, end: &str) -> BookingRequest {
    BookingRequest {
        room_id,
        user_id: Ulid::new(),
        start: d(start),
        end: d(end),
        tier: Tier::Standard,
    }
}

async fn seeded_engine(dir: &PathBuf, outbox: Arc<DurableOutbox>) -> (Arc<Engine>, Ulid) {
    let engine = Arc::new(
        Engine::new(dir.join("reservations.wal"), outbox, EngineConfig::default()).unwrap(),
    );
    let hotel = engine
        .add_hotel("Harborfront".into(), "Porto".into())
        .await
        .unwrap();
    let room_id = engine
        .add_room(hotel.id, "12".into(), 2, dec!(140))
        .await
        .unwrap();
    (engine, room_id)
}

#[tokio::test]
async fn booking_reaches_subscriber_through_relay() {
    let dir = test_dir("relay");
    let outbox = Arc::new(DurableOutbox::open(&dir.join("bookings.outbox")).unwrap());
    let (engine, room_id) = seeded_engine(&dir, outbox.clone()).await;

    let mut rx = outbox.subscribe();
    tokio::spawn(run_relay(outbox.clone(), Duration::from_millis(10)));

    let reservation = engine
        .create_booking(request(room_id, "2024-07-20", "2024-07-23"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("relay should deliver within the timeout")
        .unwrap();
    assert_eq!(event.reservation_id, reservation.id);
    assert_eq!(event.total_price, dec!(420.00));
}

#[tokio::test]
async fn undelivered_events_redeliver_after_restart() {
    let dir = test_dir("redelivery");
    let outbox_path = dir.join("bookings.outbox");

    let reservation = {
        let outbox = Arc::new(DurableOutbox::open(&outbox_path).unwrap());
        let (engine, room_id) = seeded_engine(&dir, outbox.clone()).await;
        let reservation = engine
            .create_booking(request(room_id, "2024-07-20", "2024-07-23"))
            .await
            .unwrap();
        // No subscribers, no relay: the event stays durably queued
        assert_eq!(outbox.deliver_pending().await.unwrap(), 0);
        reservation
    };

    // "Restart": a fresh outbox over the same files picks the event up
    let outbox = DurableOutbox::open(&outbox_path).unwrap();
    let mut rx = outbox.subscribe();
    assert_eq!(outbox.deliver_pending().await.unwrap(), 1);
    assert_eq!(rx.recv().await.unwrap().reservation_id, reservation.id);
    assert!(outbox.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn overlapping_race_publishes_exactly_one_event() {
    let dir = test_dir("race");
    let outbox = Arc::new(DurableOutbox::open(&dir.join("bookings.outbox")).unwrap());
    let (engine, room_id) = seeded_engine(&dir, outbox.clone()).await;

    let a = {
        let engine = engine.clone();
        tokio::spawn(
            async move { engine.create_booking(request(room_id, "2024-07-20", "2024-07-25")).await },
        )
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(
            async move { engine.create_booking(request(room_id, "2024-07-22", "2024-07-27")).await },
        )
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(
        [&a, &b]
            .iter()
            .any(|r| matches!(r, Err(BookingError::RoomUnavailable(_))))
    );

    // The loser left nothing in the outbox
    assert_eq!(outbox.pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_restart_keeps_reservations_and_queue_independent() {
    let dir = test_dir("engine_restart");
    let outbox_path = dir.join("bookings.outbox");
    let wal_path = dir.join("reservations.wal");

    let (room_id, user_id) = {
        let outbox = Arc::new(DurableOutbox::open(&outbox_path).unwrap());
        let engine =
            Engine::new(wal_path.clone(), outbox, EngineConfig::default()).unwrap();
        let hotel = engine
            .add_hotel("Harborfront".into(), "Porto".into())
            .await
            .unwrap();
        let room_id = engine
            .add_room(hotel.id, "12".into(), 2, dec!(140))
            .await
            .unwrap();
        let reservation = engine
            .create_booking(request(room_id, "2024-07-20", "2024-07-23"))
            .await
            .unwrap();
        (room_id, reservation.user_id)
    };

    let outbox = Arc::new(DurableOutbox::open(&outbox_path).unwrap());
    let engine = Engine::new(wal_path, outbox.clone(), EngineConfig::default()).unwrap();

    // Reservation state replayed from its own WAL
    assert_eq!(engine.reservations_for_user(user_id).await.len(), 1);
    let result = engine
        .create_booking(request(room_id, "2024-07-21", "2024-07-24"))
        .await;
    assert!(matches!(result, Err(BookingError::RoomUnavailable(_))));

    // The original event is still pending in the outbox, unharmed by replay
    assert_eq!(outbox.pending().await.unwrap().len(), 1);
}
