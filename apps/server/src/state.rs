//! Application state management.
//!
//! The cycle runner is the only writer of the market snapshot; HTTP and
//! WebSocket handlers read it through a `watch` receiver.

use crate::config::AppConfig;
use arbitrage_core::{ExchangeId, Opportunity, Quote};
use arbitrage_feeds::QuoteSource;
use arbitrage_storage::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Everything known after the latest completed cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketSnapshot {
    /// Cycle number, starting at 1. Zero before the first cycle completes.
    pub cycle: u64,
    pub quotes: Vec<Quote>,
    /// Ranked opportunities.
    pub opportunities: Vec<Opportunity>,
    pub failed_exchanges: Vec<ExchangeId>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub type SnapshotSender = watch::Sender<Arc<MarketSnapshot>>;
pub type SnapshotReceiver = watch::Receiver<Arc<MarketSnapshot>>;

/// Create the snapshot channel, starting from an empty snapshot.
pub fn snapshot_channel() -> (SnapshotSender, SnapshotReceiver) {
    watch::channel(Arc::new(MarketSnapshot::default()))
}

/// Statistics for the bot.
#[derive(Debug)]
pub struct BotStats {
    /// Number of completed cycles.
    pub cycles: AtomicU64,
    /// Number of quotes received.
    pub quotes_received: AtomicU64,
    /// Number of failed exchange fetches.
    pub fetch_failures: AtomicU64,
    /// Failed fetches that will not clear up by retrying next cycle.
    pub permanent_failures: AtomicU64,
    /// Number of opportunities detected.
    pub opportunities_detected: AtomicU64,
    /// Number of those still profitable after fees.
    pub profitable_detected: AtomicU64,
    /// Directions dropped for bad data.
    pub skipped_directions: AtomicU64,
    /// Cycles the persistence queue had no room for.
    pub batches_dropped: AtomicU64,
    started_at: Instant,
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            quotes_received: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            permanent_failures: AtomicU64::new(0),
            opportunities_detected: AtomicU64::new(0),
            profitable_detected: AtomicU64::new(0),
            skipped_directions: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_cycle(&self, quotes: usize, failures: usize, permanent: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.quotes_received.fetch_add(quotes as u64, Ordering::Relaxed);
        self.fetch_failures.fetch_add(failures as u64, Ordering::Relaxed);
        self.permanent_failures
            .fetch_add(permanent as u64, Ordering::Relaxed);
    }

    pub fn record_opportunities(&self, total: usize, profitable: usize) {
        self.opportunities_detected
            .fetch_add(total as u64, Ordering::Relaxed);
        self.profitable_detected
            .fetch_add(profitable as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        self.skipped_directions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped_batch(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            quotes_received: self.quotes_received.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            opportunities_detected: self.opportunities_detected.load(Ordering::Relaxed),
            profitable_detected: self.profitable_detected.load(Ordering::Relaxed),
            skipped_directions: self.skipped_directions.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub cycles: u64,
    pub quotes_received: u64,
    pub fetch_failures: u64,
    pub permanent_failures: u64,
    pub opportunities_detected: u64,
    pub profitable_detected: u64,
    pub skipped_directions: u64,
    pub batches_dropped: u64,
    pub uptime_secs: u64,
}

/// Application state shared across components.
pub struct AppState {
    /// Configuration, fixed at startup.
    pub config: AppConfig,
    /// Read side of the market snapshot.
    pub snapshot: SnapshotReceiver,
    /// Quote source, for health queries.
    pub source: Arc<dyn QuoteSource>,
    /// History database.
    pub database: Database,
    /// Bot statistics.
    pub stats: Arc<BotStats>,
    /// Running flag.
    running: AtomicBool,
}

/// Shared state handle.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        snapshot: SnapshotReceiver,
        source: Arc<dyn QuoteSource>,
        database: Database,
        stats: Arc<BotStats>,
    ) -> Self {
        Self {
            config,
            snapshot,
            source,
            database,
            stats,
            running: AtomicBool::new(false),
        }
    }

    /// Latest published snapshot.
    pub fn current_snapshot(&self) -> Arc<MarketSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats_summary(&self) -> StatsSummary {
        self.stats.summary()
    }
}

/// State over an in-memory database and the simulated source.
#[cfg(test)]
pub(crate) async fn test_state() -> (SharedState, SnapshotSender) {
    let (tx, rx) = snapshot_channel();
    let database = Database::connect("sqlite::memory:").await.unwrap();
    let state = AppState::new(
        AppConfig::default(),
        rx,
        Arc::new(arbitrage_feeds::SimulatedQuoteSource::default()),
        database,
        Arc::new(BotStats::new()),
    );
    (Arc::new(state), tx)
}
