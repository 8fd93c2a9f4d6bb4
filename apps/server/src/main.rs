//! BTC/JPY Arbitrage Monitor - Headless Server
//!
//! Polls Japanese exchanges, ranks cross-exchange opportunities after fees,
//! and serves the results over HTTP and WebSocket.

mod config;
mod cycle;
mod state;
mod ws_server;

use arbitrage_engine::{FeeModel, OpportunityDetector};
use arbitrage_feeds::{FeedError, QuoteSource, RestQuoteSource, SimulatedQuoteSource};
use arbitrage_storage::{persistence_channel, spawn_persistence_worker, Database};
use clap::Parser;
use config::AppConfig;
use cycle::CycleRunner;
use state::{snapshot_channel, AppState, BotStats, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use ws_server::BroadcastSender;

/// Interval between history cleanups.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// BTC/JPY Arbitrage Monitor CLI
#[derive(Parser, Debug)]
#[command(name = "btcjpy-arb")]
#[command(about = "BTC/JPY cross-exchange arbitrage monitor", long_about = None)]
struct Args {
    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum gross spread in percent
    #[arg(short, long)]
    threshold: Option<f64>,

    /// BTC quantity used for fee evaluation
    #[arg(short, long)]
    quantity: Option<f64>,

    /// Polling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// HTTP / WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// SQLite database URL
    #[arg(long)]
    database: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use the simulated quote source instead of live tickers
    #[arg(long, default_value_t = false)]
    demo: bool,
}

impl Args {
    /// Override file values with flags that were given.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(threshold) = self.threshold {
            config.detector.threshold_pct = threshold;
        }
        if let Some(quantity) = self.quantity {
            config.detector.reference_quantity = quantity;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.polling.interval_ms = interval_ms;
        }
        if let Some(port) = self.ws_port {
            config.ws_port = port;
        }
        if let Some(url) = &self.database {
            config.storage.database_url = url.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.demo {
            config.demo = true;
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn QuoteSource>, FeedError> {
    if config.demo {
        info!("🎮 Using SIMULATED quote source");
        let exchanges = config.polling.exchanges.iter().map(|e| e.id()).collect();
        return Ok(Arc::new(SimulatedQuoteSource::new(exchanges, 10_000_000.0)));
    }

    info!("📡 Using LIVE exchange tickers");
    let timeout = config.polling.request_timeout();
    let source = RestQuoteSource::new(&config.polling.exchanges, timeout)?;
    Ok(Arc::new(source))
}

async fn run_stats_reporter(state: SharedState, broadcast_tx: BroadcastSender) {
    info!("Starting stats reporter");

    loop {
        // Check every 100ms if we should stop, but only report every 60s
        for _ in 0..600 {
            if !state.is_running() {
                info!("Stats reporter stopped");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let summary = state.stats_summary();
        info!(
            "📊 Stats | Uptime: {}s | Cycles: {} | Quotes: {} | Opps: {} ({} profitable)",
            summary.uptime_secs,
            summary.cycles,
            summary.quotes_received,
            summary.opportunities_detected,
            summary.profitable_detected
        );
        info!(
            "  Fetch failures: {} ({} permanent)",
            summary.fetch_failures, summary.permanent_failures
        );

        ws_server::broadcast_stats(&broadcast_tx, &state);
    }
}

async fn run_history_cleanup(state: SharedState) {
    let retention_days = state.config.storage.retention_days;
    info!("Starting history cleanup (keeping {} days)", retention_days);

    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    while state.is_running() {
        ticker.tick().await;
        match state.database.cleanup_old_history(retention_days).await {
            Ok(0) => {}
            Ok(deleted) => info!("🧹 Removed {} old history rows", deleted),
            Err(e) => warn!("History cleanup failed: {}", e),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref());
    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            error!("{}", e);
            return;
        }
    };
    args.apply(&mut config);

    init_logging(&config.log_level);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return;
    }

    info!("🚀 BTC/JPY arbitrage monitor starting...");
    info!("  Threshold: {}%", config.detector.threshold_pct);
    info!("  Reference quantity: {} BTC", config.detector.reference_quantity);
    info!("  Interval: {}ms", config.polling.interval_ms);
    info!("  Exchanges: {:?}", config.polling.exchanges);
    info!("  Database: {}", config.storage.database_url);
    info!("  Server port: {}", config.ws_port);

    let detector = match OpportunityDetector::new(
        config.detector_config(),
        FeeModel::new(config.fees.clone()),
    ) {
        Ok(detector) => detector,
        Err(e) => {
            error!("Invalid detector configuration: {}", e);
            return;
        }
    };

    let database = match Database::connect(&config.storage.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return;
        }
    };

    let source = match build_source(&config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to create quote source: {}", e);
            return;
        }
    };

    let (persistence, persistence_rx) = persistence_channel(config.storage.queue_capacity);
    let persistence_handle = spawn_persistence_worker(Arc::new(database.clone()), persistence_rx);

    let interval = config.polling.interval();
    let ws_port = config.ws_port;
    let stats = Arc::new(BotStats::new());
    let (snapshot_tx, snapshot_rx) = snapshot_channel();
    let state: SharedState = Arc::new(AppState::new(
        config,
        snapshot_rx,
        source.clone(),
        database,
        stats.clone(),
    ));
    state.start();

    // Server first, so the runner has a broadcast sender
    let broadcast_tx = match ws_server::start_ws_server(state.clone(), ws_port).await {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return;
        }
    };

    let runner = CycleRunner::new(
        snapshot_tx,
        source,
        detector,
        persistence,
        broadcast_tx.clone(),
        stats,
    );
    let detector_handle = tokio::spawn(runner.run(state.clone(), interval));

    let stats_handle = tokio::spawn(run_stats_reporter(state.clone(), broadcast_tx.clone()));
    let cleanup_handle = tokio::spawn(run_history_cleanup(state.clone()));

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    state.stop();

    // Wait for tasks with timeout, then abort
    let _ = tokio::time::timeout(interval + Duration::from_secs(2), detector_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), stats_handle).await;
    cleanup_handle.abort();

    // The runner owned the last persistence sender; let the worker drain
    match tokio::time::timeout(Duration::from_secs(5), persistence_handle).await {
        Ok(Ok(worker)) => info!(
            "  Persisted {} cycles ({} failures)",
            worker.batches, worker.failures
        ),
        _ => warn!("Persistence worker did not finish in time"),
    }

    // Final stats
    let summary = state.stats_summary();
    info!("📈 Final Stats:");
    info!("  Total uptime: {} seconds", summary.uptime_secs);
    info!("  Cycles: {}", summary.cycles);
    info!("  Opportunities: {}", summary.opportunities_detected);
    info!("  Profitable: {}", summary.profitable_detected);
    info!("  Dropped batches: {}", summary.batches_dropped);

    info!("👋 Arbitrage monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "btcjpy-arb",
            "--threshold",
            "0.5",
            "--quantity",
            "0.1",
            "--interval-ms",
            "1000",
            "--ws-port",
            "9100",
            "--database",
            "sqlite::memory:",
            "--demo",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.detector.threshold_pct, 0.5);
        assert_eq!(config.detector.reference_quantity, 0.1);
        assert_eq!(config.polling.interval_ms, 1000);
        assert_eq!(config.ws_port, 9100);
        assert_eq!(config.storage.database_url, "sqlite::memory:");
        assert!(config.demo);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_absent_flags_keep_file_values() {
        let args = Args::parse_from(["btcjpy-arb"]);
        let json = r#"{"detector": {"threshold_pct": 0.3}, "ws_port": 9200}"#;
        let mut config = AppConfig::from_json(json).unwrap();
        args.apply(&mut config);

        assert_eq!(config.detector.threshold_pct, 0.3);
        assert_eq!(config.ws_port, 9200);
        assert!(!config.demo);
    }

    #[test]
    fn test_demo_source_reports_configured_exchanges() {
        let mut config = AppConfig::default();
        config.demo = true;
        let source = build_source(&config).unwrap();
        assert_eq!(source.exchanges().len(), config.polling.exchanges.len());
    }
}
