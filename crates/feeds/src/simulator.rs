//! Simulated quote source for demo mode.
//!
//! Prices follow a deterministic sinusoidal drift around a base price, with
//! a per-exchange offset, so spreads between venues open and close over time
//! without network access.

use crate::source::{PollResult, QuoteSource};
use arbitrage_core::{Exchange, ExchangeId, Quote};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Demo source producing synthetic BTC/JPY quotes.
pub struct SimulatedQuoteSource {
    exchanges: Vec<ExchangeId>,
    base_price: f64,
    tick: AtomicU64,
}

impl Default for SimulatedQuoteSource {
    fn default() -> Self {
        Self::new(Exchange::all().iter().map(|&e| e.id()).collect(), 10_000_000.0)
    }
}

impl SimulatedQuoteSource {
    pub fn new(exchanges: Vec<ExchangeId>, base_price: f64) -> Self {
        Self {
            exchanges,
            base_price,
            tick: AtomicU64::new(0),
        }
    }

    /// Quotes for a given tick. Pure: the same tick always yields the same
    /// prices.
    pub fn quotes_at(&self, tick: u64) -> Vec<Quote> {
        let t = tick as f64;
        let base = self.base_price * (1.0 + (t * 0.01).sin() * 0.002);

        self.exchanges
            .iter()
            .enumerate()
            .map(|(i, exchange)| {
                let phase = i as f64 * 1.3;
                // Venue offsets swing by up to about 1.2% so that the
                // threshold is crossed now and then.
                let variance = 1.0 + (i as f64 * 0.0005) + (t * 0.15 + phase).sin() * 0.006;
                let mid = (base * variance).round();
                let half_spread = (mid * 0.0002).round();
                Quote::new(
                    exchange.clone(),
                    Some(mid),
                    Some(mid - half_spread),
                    Some(mid + half_spread),
                    Utc::now(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl QuoteSource for SimulatedQuoteSource {
    async fn fetch_quotes(&self) -> PollResult {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        PollResult {
            quotes: self.quotes_at(tick),
            failures: Vec::new(),
        }
    }

    fn exchanges(&self) -> Vec<ExchangeId> {
        self.exchanges.clone()
    }
}
