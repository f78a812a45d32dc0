//! Trade Collector Binary
//!
//! Starts the resumable ISS trade collector.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-collector
//! ```
//!
//! # Environment Variables
//!
//! - `ISS_BASE_URL`: ISS API base (default: <https://iss.moex.com/iss>)
//! - `ISS_RATE_LIMIT_MS`: Minimum spacing between requests (default: 1000)
//! - `COLLECTOR_TICKER_MODE`: specific | all (default: specific)
//! - `COLLECTOR_TICKERS`: Comma-separated instruments for specific mode
//! - `COLLECTOR_INTERVAL_MS`: Delay between cycles (default: 3000)
//! - `COLLECTOR_CURSOR_PATH`: Cursor file (default: data/collection-cursor.json)
//! - `COLLECTOR_HEALTH_PORT`: Health/metrics HTTP port, 0 disables (default: 8082)
//! - `BUS_TRADES_TOPIC` / `BUS_INSTRUMENTS_TOPIC`: Output topics
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: trade_collector=info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_collector::domain::dedup::DedupCache;
use trade_collector::infrastructure::telemetry;
use trade_collector::{
    BroadcastBus, Collector, CollectorPorts, CollectorSettings, ExchangeClock, FileCursorStore,
    HealthServer, HealthServerState, IssClient, MetricsSink, RateLimiter, init_metrics,
};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Trade Collector");

    let _metrics_handle = init_metrics();

    let settings = CollectorSettings::from_env()?;
    log_settings(&settings);

    let shutdown_token = CancellationToken::new();

    // Taps stop only after the collector has finished its last tick.
    let taps_token = CancellationToken::new();
    let bus = Arc::new(BroadcastBus::new(settings.bus.capacity));
    let taps = [
        bus.spawn_tap(&settings.bus.trades_topic, taps_token.clone()),
        bus.spawn_tap(&settings.bus.instruments_topic, taps_token.clone()),
    ];

    let client = IssClient::new(settings.iss.client_config())?;
    let ports = CollectorPorts {
        source: Arc::new(client),
        store: Arc::new(FileCursorStore::new(
            settings.collection.cursor_path.clone(),
        )),
        bus: bus.clone(),
        clock: Arc::new(ExchangeClock::from_offset_hours(
            settings.iss.utc_offset_hours,
        )),
    };

    let collector = Arc::new(Collector::new(
        settings.collector_config(),
        ports,
        Arc::new(RateLimiter::new(settings.iss.rate_limit)),
        Arc::new(DedupCache::new(settings.collection.dedup_capacity)),
        Arc::new(MetricsSink::new()),
    ));

    if settings.collection.health_port > 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&collector),
            Arc::clone(&bus),
        ));
        let health_server = HealthServer::new(
            settings.collection.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let collector_task = {
        let collector = Arc::clone(&collector);
        let shutdown = shutdown_token.clone();
        tokio::spawn(async move { collector.run(shutdown).await })
    };

    tracing::info!("Trade collector ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, collector_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Collector task failed"),
        Err(_) => tracing::warn!("Collector did not stop within the shutdown timeout"),
    }

    taps_token.cancel();
    for tap in taps {
        if let Err(e) = tap.await {
            tracing::warn!(error = %e, "Bus tap task failed");
        }
    }

    collector.metrics().log_snapshot();
    tracing::info!("Trade collector stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_settings(settings: &CollectorSettings) {
    tracing::info!(
        enabled = settings.collection.enabled,
        ticker_mode = settings.collection.ticker_mode.as_str(),
        tickers = ?settings.collection.tickers,
        batch_size = settings.collection.batch_size,
        interval_ms = settings.collection.interval.as_millis(),
        health_port = settings.collection.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %settings.iss.base_url,
        engine = %settings.iss.engine,
        market = %settings.iss.market,
        rate_limit_ms = settings.iss.rate_limit.as_millis(),
        cursor_path = %settings.collection.cursor_path.display(),
        "Upstream and persistence"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
