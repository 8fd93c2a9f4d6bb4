//! Persistence worker fed by the detection loop.
//!
//! The cycle runner hands each cycle's output to a bounded channel and moves
//! on. A separate task drains the channel into a [`PersistenceSink`]; store
//! failures are logged and never reach the detector.

use crate::db::{Database, StorageError};
use arbitrage_core::{Opportunity, OpportunityRecord, Quote};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default capacity of the persistence queue, in cycles.
pub const PERSISTENCE_QUEUE_CAPACITY: usize = 64;

/// Destination for cycle history.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store_quotes(&self, quotes: &[Quote]) -> Result<(), StorageError>;

    async fn store_opportunity(&self, record: &OpportunityRecord) -> Result<(), StorageError>;
}

#[async_trait]
impl PersistenceSink for Database {
    async fn store_quotes(&self, quotes: &[Quote]) -> Result<(), StorageError> {
        self.insert_quotes(quotes).await.map(|_| ())
    }

    async fn store_opportunity(&self, record: &OpportunityRecord) -> Result<(), StorageError> {
        self.insert_opportunity(record).await.map(|_| ())
    }
}

/// Everything one detection cycle wants persisted.
#[derive(Debug, Clone)]
pub struct CycleBatch {
    pub cycle: u64,
    pub quotes: Vec<Quote>,
    pub opportunities: Vec<Opportunity>,
}

/// Producer side of the persistence queue.
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<CycleBatch>,
}

impl PersistenceHandle {
    /// Queue a batch without waiting. Returns false if the batch was dropped.
    pub fn submit(&self, batch: CycleBatch) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                warn!(cycle = batch.cycle, "Persistence queue full, dropping batch");
                false
            }
            Err(TrySendError::Closed(batch)) => {
                warn!(cycle = batch.cycle, "Persistence worker stopped, dropping batch");
                false
            }
        }
    }
}

/// Create the bounded persistence queue.
pub fn persistence_channel(capacity: usize) -> (PersistenceHandle, mpsc::Receiver<CycleBatch>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PersistenceHandle { tx }, rx)
}

/// Totals reported by the worker when its queue closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub quotes_stored: u64,
    pub opportunities_stored: u64,
    pub failures: u64,
}

/// Spawn the worker draining `rx` into `sink`.
///
/// Quotes are stored first, then each opportunity on its own so that one bad
/// record does not lose the rest. The task ends when every sender is dropped.
pub fn spawn_persistence_worker(
    sink: Arc<dyn PersistenceSink>,
    mut rx: mpsc::Receiver<CycleBatch>,
) -> JoinHandle<WorkerStats> {
    tokio::spawn(async move {
        info!("Starting persistence worker");
        let mut stats = WorkerStats::default();

        while let Some(batch) = rx.recv().await {
            stats.batches += 1;

            if !batch.quotes.is_empty() {
                match sink.store_quotes(&batch.quotes).await {
                    Ok(()) => stats.quotes_stored += batch.quotes.len() as u64,
                    Err(e) => {
                        stats.failures += 1;
                        warn!(cycle = batch.cycle, "Failed to store quotes: {}", e);
                    }
                }
            }

            for opp in &batch.opportunities {
                match sink.store_opportunity(&opp.to_record()).await {
                    Ok(()) => stats.opportunities_stored += 1,
                    Err(e) => {
                        stats.failures += 1;
                        warn!(
                            cycle = batch.cycle,
                            route = %opp.route_label(),
                            "Failed to store opportunity: {}",
                            e
                        );
                    }
                }
            }

            debug!(cycle = batch.cycle, "Persisted cycle");
        }

        info!(
            batches = stats.batches,
            failures = stats.failures,
            "Persistence worker stopped"
        );
        stats
    })
}
