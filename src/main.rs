use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use lodge::engine::{Engine, EngineConfig};
use lodge::occupancy;
use lodge::outbox::{DurableOutbox, RetryPolicy, run_relay};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("LODGE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    lodge::observability::init(metrics_port);

    let data_dir = std::env::var("LODGE_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let lock_timeout_ms: u64 = std::env::var("LODGE_LOCK_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    let publish_retries: usize = std::env::var("LODGE_PUBLISH_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let data_dir = PathBuf::from(data_dir);
    let outbox = Arc::new(DurableOutbox::open(&data_dir.join("bookings.outbox"))?);
    let config = EngineConfig {
        lock_timeout: Duration::from_millis(lock_timeout_ms),
        publish_retry: RetryPolicy {
            max_retries: publish_retries,
            ..RetryPolicy::default()
        },
    };
    let engine = Arc::new(Engine::new(
        data_dir.join("reservations.wal"),
        outbox.clone(),
        config,
    )?);

    info!("lodge reservation store ready");
    info!("  data_dir: {}", data_dir.display());
    info!("  hotels: {}", engine.list_hotels().len());
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Sample notification consumer: logs every delivered booking event the
    // way the downstream alerting service would consume it.
    let mut events = outbox.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("booking notification: {json}"),
                    Err(e) => tracing::error!("failed to render booking event: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("notification consumer lagged, skipped {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(run_relay(outbox.clone(), Duration::from_secs(1)));
    tokio::spawn(occupancy::run_occupancy_monitor(
        engine.clone(),
        Duration::from_secs(3600),
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");

    // Drain: give the relay one last chance to hand off queued events
    if let Ok(n) = outbox.deliver_pending().await
        && n > 0
    {
        info!("drained {n} pending booking events");
    }

    info!("lodge stopped");
    Ok(())
}
