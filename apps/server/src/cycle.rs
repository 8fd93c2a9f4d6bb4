//! Detection cycle runner.
//!
//! Each tick fetches quotes, detects and ranks opportunities, publishes the
//! snapshot, then hands the cycle to persistence and the broadcast channel.

use crate::state::{BotStats, MarketSnapshot, SharedState, SnapshotSender};
use crate::ws_server::{self, BroadcastSender};
use arbitrage_engine::{format_jpy, format_pct, rank, OpportunityDetector};
use arbitrage_feeds::QuoteSource;
use arbitrage_storage::{CycleBatch, PersistenceHandle};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Owns the write side of the snapshot; there is exactly one per process.
pub struct CycleRunner {
    snapshot_tx: SnapshotSender,
    source: Arc<dyn QuoteSource>,
    detector: OpportunityDetector,
    persistence: PersistenceHandle,
    broadcast_tx: BroadcastSender,
    stats: Arc<BotStats>,
    cycle: u64,
}

impl CycleRunner {
    pub fn new(
        snapshot_tx: SnapshotSender,
        source: Arc<dyn QuoteSource>,
        detector: OpportunityDetector,
        persistence: PersistenceHandle,
        broadcast_tx: BroadcastSender,
        stats: Arc<BotStats>,
    ) -> Self {
        Self {
            snapshot_tx,
            source,
            detector,
            persistence,
            broadcast_tx,
            stats,
            cycle: 0,
        }
    }

    /// Run one full cycle and return the published snapshot.
    pub async fn run_cycle(&mut self) -> Arc<MarketSnapshot> {
        self.cycle += 1;
        let cycle = self.cycle;

        let poll = self.source.fetch_quotes().await;
        let mut permanent_failures = 0;
        for (exchange, err) in &poll.failures {
            if err.is_transient() {
                debug!(cycle, %exchange, "Quote fetch failed, will retry next cycle: {}", err);
            } else {
                permanent_failures += 1;
                warn!(cycle, %exchange, "Quote fetch failed: {}", err);
            }
        }

        let observed_at = Utc::now();
        let report = self.detector.scan(&poll.quotes, observed_at);
        for skipped in &report.skipped {
            warn!(
                cycle,
                buy = %skipped.buy_exchange,
                sell = %skipped.sell_exchange,
                "Skipped direction: {:?}",
                skipped.reason
            );
        }

        let mut opportunities = report.opportunities;
        rank(&mut opportunities);

        let profitable = opportunities
            .iter()
            .filter(|o| o.is_profitable_after_fees)
            .count();
        for opp in opportunities.iter().filter(|o| o.is_profitable_after_fees) {
            info!(
                "🎯 {} | Spread: {} | Net: {} ({})",
                opp.route_label(),
                format_pct(opp.gross_spread_pct),
                format_jpy(opp.net_profit),
                format_pct(opp.net_profit_pct)
            );
        }
        debug!(
            cycle,
            quotes = poll.quotes.len(),
            opportunities = opportunities.len(),
            profitable,
            "Cycle complete"
        );

        let snapshot = Arc::new(MarketSnapshot {
            cycle,
            failed_exchanges: poll.failed_exchanges(),
            quotes: poll.quotes,
            opportunities,
            updated_at: Some(observed_at),
        });
        self.snapshot_tx.send_replace(snapshot.clone());

        let batch = CycleBatch {
            cycle,
            quotes: snapshot.quotes.clone(),
            opportunities: snapshot.opportunities.clone(),
        };
        if !self.persistence.submit(batch) {
            self.stats.record_dropped_batch();
        }

        ws_server::broadcast_snapshot(&self.broadcast_tx, &snapshot);

        self.stats.record_cycle(
            snapshot.quotes.len(),
            snapshot.failed_exchanges.len(),
            permanent_failures,
        );
        self.stats
            .record_opportunities(snapshot.opportunities.len(), profitable);
        self.stats.record_skipped(report.skipped.len());

        snapshot
    }

    /// Run cycles at a fixed cadence until the state stops running.
    ///
    /// A cycle that overruns the interval delays the next tick instead of
    /// queueing a burst.
    pub async fn run(mut self, state: SharedState, interval: Duration) {
        info!("Starting detection loop ({}ms interval)", interval.as_millis());

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while state.is_running() {
            ticker.tick().await;
            if !state.is_running() {
                break;
            }
            self.run_cycle().await;
        }

        info!("Detection loop stopped after {} cycles", self.cycle);
    }
}
