pub mod engine;
pub mod model;
pub mod observability;
pub mod occupancy;
pub mod outbox;
pub mod pricing;
pub mod wal;
