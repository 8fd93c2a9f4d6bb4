//! Per-exchange quote snapshots.

use crate::ExchangeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exchange's BTC/JPY bid/ask/last snapshot for a single polling cycle.
///
/// Prices are in JPY. `bid` and `ask` are optional: an exchange that did not
/// report a side in this cycle leaves it absent, and an absent side is never
/// read as zero. Negative or non-finite values are dropped at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub exchange: ExchangeId,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        exchange: impl Into<ExchangeId>,
        last: Option<f64>,
        bid: Option<f64>,
        ask: Option<f64>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            last: sanitize_price(last),
            bid: sanitize_price(bid),
            ask: sanitize_price(ask),
            observed_at,
        }
    }

    /// Quote with both sides present, stamped now.
    pub fn with_bid_ask(exchange: impl Into<ExchangeId>, bid: f64, ask: f64) -> Self {
        let last = (bid + ask) / 2.0;
        Self::new(exchange, Some(last), Some(bid), Some(ask), Utc::now())
    }

    /// True if at least one side can take part in a pair evaluation.
    #[inline]
    pub fn has_book(&self) -> bool {
        self.bid.is_some() || self.ask.is_some()
    }

    /// Mid price when both sides are present.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Own-book spread in percent of the bid, if computable.
    pub fn spread_pct(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => spread_pct(bid, ask),
            _ => None,
        }
    }
}

fn sanitize_price(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Percentage spread `(sell - buy) * 100 / buy`.
///
/// Returns `None` for a zero, negative or non-finite buy price so callers
/// never see `Infinity`/`NaN`.
pub fn spread_pct(buy: f64, sell: f64) -> Option<f64> {
    if !buy.is_finite() || !sell.is_finite() || buy <= 0.0 {
        return None;
    }
    Some((sell - buy) * 100.0 / buy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_drops_invalid_prices() {
        let quote = Quote::new(
            "bitflyer",
            Some(f64::NAN),
            Some(-1.0),
            Some(5_000_000.0),
            Utc::now(),
        );
        assert_eq!(quote.last, None);
        assert_eq!(quote.bid, None);
        assert_eq!(quote.ask, Some(5_000_000.0));
        assert!(quote.has_book());
    }

    #[test]
    fn test_quote_keeps_zero() {
        let quote = Quote::new("zaif", None, Some(0.0), None, Utc::now());
        assert_eq!(quote.bid, Some(0.0));
    }

    #[test]
    fn test_quote_without_book() {
        let quote = Quote::new("zaif", Some(5_000_000.0), None, None, Utc::now());
        assert!(!quote.has_book());
        assert_eq!(quote.mid(), None);
    }

    #[test]
    fn test_quote_mid_and_spread() {
        let quote = Quote::with_bid_ask("coincheck", 4_999_000.0, 5_001_000.0);
        assert_eq!(quote.mid(), Some(5_000_000.0));
        let spread = quote.spread_pct().unwrap();
        assert!((spread - 0.040008).abs() < 1e-5);
    }

    #[test]
    fn test_spread_pct_guards_zero_buy() {
        assert_eq!(spread_pct(0.0, 100.0), None);
        assert_eq!(spread_pct(-5.0, 100.0), None);
        assert_eq!(spread_pct(f64::INFINITY, 100.0), None);
        assert_eq!(spread_pct(100.0, 101.0), Some(1.0));
    }
}
