//! Quote sources polled once per detection cycle.

use crate::error::FeedError;
use crate::rest::{ExchangeTicker, TickerFetcher};
use arbitrage_core::{Exchange, ExchangeId, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout for ticker fetches.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of polling every exchange once.
///
/// A failing exchange is simply missing from `quotes`; the cycle goes on
/// with whatever was collected.
#[derive(Debug, Default)]
pub struct PollResult {
    /// Quotes in fetcher order.
    pub quotes: Vec<Quote>,
    pub failures: Vec<(ExchangeId, FeedError)>,
}

impl PollResult {
    pub fn failed_exchanges(&self) -> Vec<ExchangeId> {
        self.failures.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Per-exchange polling health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExchangeHealth {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ExchangeHealth {
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }

    fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_success = Some(at);
    }

    fn record_failure(&mut self, err: &FeedError) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_error = Some(err.to_string());
    }
}

/// Something that can produce the quotes of one cycle.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Poll every exchange once. Never fails as a whole.
    async fn fetch_quotes(&self) -> PollResult;

    /// Exchanges this source reports for.
    fn exchanges(&self) -> Vec<ExchangeId>;

    /// Polling health per exchange, in `exchanges()` order.
    fn health(&self) -> Vec<(ExchangeId, ExchangeHealth)> {
        Vec::new()
    }
}

/// Polls exchange REST tickers concurrently.
pub struct RestQuoteSource {
    client: reqwest::Client,
    fetchers: Vec<Arc<dyn TickerFetcher>>,
    health: DashMap<ExchangeId, ExchangeHealth>,
}

impl RestQuoteSource {
    /// Source over the built-in fetchers for `exchanges`.
    pub fn new(exchanges: &[Exchange], timeout: Duration) -> Result<Self, FeedError> {
        let fetchers = exchanges
            .iter()
            .map(|&exchange| Arc::new(ExchangeTicker::new(exchange)) as Arc<dyn TickerFetcher>)
            .collect();
        Self::with_fetchers(fetchers, timeout)
    }

    /// Source over arbitrary fetchers.
    pub fn with_fetchers(
        fetchers: Vec<Arc<dyn TickerFetcher>>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("btcjpy-arb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Http(e.to_string()))?;

        let health = DashMap::new();
        for fetcher in &fetchers {
            health.insert(fetcher.exchange(), ExchangeHealth::default());
        }

        Ok(Self {
            client,
            fetchers,
            health,
        })
    }

    pub fn health_of(&self, exchange: &ExchangeId) -> Option<ExchangeHealth> {
        self.health.get(exchange).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl QuoteSource for RestQuoteSource {
    async fn fetch_quotes(&self) -> PollResult {
        let futures: Vec<_> = self
            .fetchers
            .iter()
            .map(|fetcher| {
                let client = &self.client;
                async move { (fetcher.exchange(), fetcher.fetch(client).await) }
            })
            .collect();

        let mut result = PollResult::default();
        for (exchange, outcome) in join_all(futures).await {
            let mut health = self.health.entry(exchange.clone()).or_default();
            match outcome {
                Ok(quote) => {
                    health.record_success(quote.observed_at);
                    result.quotes.push(quote);
                }
                Err(err) => {
                    health.record_failure(&err);
                    result.failures.push((exchange, err));
                }
            }
        }

        debug!(
            quotes = result.quotes.len(),
            failures = result.failures.len(),
            "Polled tickers"
        );
        result
    }

    fn exchanges(&self) -> Vec<ExchangeId> {
        self.fetchers.iter().map(|f| f.exchange()).collect()
    }

    fn health(&self) -> Vec<(ExchangeId, ExchangeHealth)> {
        self.exchanges()
            .into_iter()
            .map(|id| {
                let health = self.health_of(&id).unwrap_or_default();
                (id, health)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fetcher that succeeds or fails on demand without touching the network.
    struct StubFetcher {
        id: &'static str,
        bid: f64,
        fail: bool,
        calls: AtomicU32,
    }

    impl StubFetcher {
        fn ok(id: &'static str, bid: f64) -> Arc<Self> {
            Arc::new(Self {
                id,
                bid,
                fail: false,
                calls: AtomicU32::new(0),
            })
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                bid: 0.0,
                fail: true,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TickerFetcher for StubFetcher {
        fn exchange(&self) -> ExchangeId {
            self.id.into()
        }

        async fn fetch(&self, _client: &reqwest::Client) -> Result<Quote, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FeedError::Timeout("stub".to_string()))
            } else {
                Ok(Quote::with_bid_ask(self.id, self.bid, self.bid + 1_000.0))
            }
        }
    }

    fn source(fetchers: Vec<Arc<dyn TickerFetcher>>) -> RestQuoteSource {
        RestQuoteSource::with_fetchers(fetchers, Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_quotes() {
        let src = source(vec![
            StubFetcher::ok("alpha", 5_000_000.0) as Arc<dyn TickerFetcher>,
            StubFetcher::failing("beta"),
            StubFetcher::ok("gamma", 5_050_000.0),
        ]);

        let result = src.fetch_quotes().await;
        let ids: Vec<&str> = result.quotes.iter().map(|q| q.exchange.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "gamma"]);
        assert_eq!(result.failed_exchanges(), vec![ExchangeId::new("beta")]);
        assert!(result.failures[0].1.is_transient());
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_quotes() {
        let src = source(vec![
            StubFetcher::failing("a") as Arc<dyn TickerFetcher>,
            StubFetcher::failing("b"),
        ]);
        let result = src.fetch_quotes().await;
        assert!(result.quotes.is_empty());
        assert_eq!(result.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_health_tracks_consecutive_failures() {
        let good = StubFetcher::ok("alpha", 5_000_000.0);
        let bad = StubFetcher::failing("beta");
        let src = source(vec![good.clone() as Arc<dyn TickerFetcher>, bad.clone()]);

        src.fetch_quotes().await;
        src.fetch_quotes().await;

        let beta = src.health_of(&"beta".into()).unwrap();
        assert_eq!(beta.consecutive_failures, 2);
        assert_eq!(beta.total_failures, 2);
        assert!(!beta.is_healthy());
        assert!(beta.last_error.is_some());

        let alpha = src.health_of(&"alpha".into()).unwrap();
        assert!(alpha.is_healthy());
        assert!(alpha.last_success.is_some());

        assert_eq!(good.calls.load(Ordering::SeqCst), 2);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_health_listing_follows_fetcher_order() {
        let src = source(vec![
            StubFetcher::ok("zeta", 1.0) as Arc<dyn TickerFetcher>,
            StubFetcher::ok("alpha", 1.0),
        ]);
        let names: Vec<String> = src
            .health()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_builtin_source_lists_exchanges() {
        let src = RestQuoteSource::new(Exchange::all(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let ids: Vec<String> = src.exchanges().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["bitflyer", "coincheck", "zaif", "gmocoin", "bitbank"]);
    }
}
