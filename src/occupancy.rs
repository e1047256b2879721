use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use tracing::warn;

use crate::engine::Engine;
use crate::model::DateRange;

/// Hotels below this occupancy over the lookahead window get flagged.
const LOW_OCCUPANCY_PCT: f64 = 20.0;

/// How far ahead the monitor looks.
const LOOKAHEAD_DAYS: u64 = 30;

/// Background task that periodically checks each hotel's upcoming occupancy
/// and warns on under-filled ones, so hotel admins can react (run promotions,
/// adjust rates). Purely observational — it never mutates the store.
pub async fn run_occupancy_monitor(engine: Arc<Engine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let today = Utc::now().date_naive();
        let horizon = today + Days::new(LOOKAHEAD_DAYS);
        let window = match DateRange::new(today, horizon) {
            Ok(w) => w,
            Err(_) => continue,
        };

        for hotel in engine.list_hotels() {
            match engine.occupancy_rate(hotel.id, &window).await {
                Ok(pct) if pct < LOW_OCCUPANCY_PCT => {
                    warn!(
                        hotel = %hotel.id,
                        name = %hotel.name,
                        "low occupancy: {pct:.2}% over the next {LOOKAHEAD_DAYS} days"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // Hotel may have been observed mid-seed — skip this round
                    tracing::debug!("occupancy check skip {}: {e}", hotel.id);
                }
            }
        }
    }
}
