//! Arbitrage opportunity types.

use crate::ExchangeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Round-trip cost components, all in JPY.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Trading fee paid on the buy exchange.
    pub buy_trading_fee: f64,
    /// Trading fee paid on the sell exchange.
    pub sell_trading_fee: f64,
    /// JPY withdrawal fee charged by the sell exchange.
    pub jpy_withdrawal_fee: f64,
    /// BTC withdrawal + network fee, valued at the buy price.
    pub btc_transfer_fee: f64,
}

impl FeeBreakdown {
    #[inline]
    pub fn total(&self) -> f64 {
        self.buy_trading_fee
            + self.sell_trading_fee
            + self.jpy_withdrawal_fee
            + self.btc_transfer_fee
    }
}

/// Cross-exchange opportunity detected in one polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    /// Ask on the buy exchange.
    pub buy_price: f64,
    /// Bid on the sell exchange.
    pub sell_price: f64,
    /// BTC quantity the fees were evaluated for.
    pub quantity: f64,
    pub gross_spread: f64,
    pub gross_spread_pct: f64,
    /// `gross_spread * quantity`.
    pub gross_profit: f64,
    pub fee_breakdown: FeeBreakdown,
    pub total_fees: f64,
    pub net_profit: f64,
    pub net_profit_pct: f64,
    pub is_profitable_after_fees: bool,
    pub observed_at: DateTime<Utc>,
}

impl Opportunity {
    /// "buy → sell" label for logs and displays.
    pub fn route_label(&self) -> String {
        format!("{} → {}", self.buy_exchange, self.sell_exchange)
    }

    pub fn to_record(&self) -> OpportunityRecord {
        OpportunityRecord::from(self)
    }
}

/// Flat row shape used for persistence and CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub exchange_from: String,
    pub exchange_to: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub gross_difference: f64,
    pub gross_percentage: f64,
    pub net_profit: f64,
    pub net_profit_percentage: f64,
    pub total_fees: f64,
    pub is_profitable: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&Opportunity> for OpportunityRecord {
    fn from(opp: &Opportunity) -> Self {
        Self {
            exchange_from: opp.buy_exchange.to_string(),
            exchange_to: opp.sell_exchange.to_string(),
            buy_price: opp.buy_price,
            sell_price: opp.sell_price,
            gross_difference: opp.gross_spread,
            gross_percentage: opp.gross_spread_pct,
            net_profit: opp.net_profit,
            net_profit_percentage: opp.net_profit_pct,
            total_fees: opp.total_fees,
            is_profitable: opp.is_profitable_after_fees,
            timestamp: opp.observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Opportunity {
        let fee_breakdown = FeeBreakdown {
            buy_trading_fee: 7_501.5,
            sell_trading_fee: 0.0,
            jpy_withdrawal_fee: 407.0,
            btc_transfer_fee: 2_500.5,
        };
        Opportunity {
            buy_exchange: "bitflyer".into(),
            sell_exchange: "coincheck".into(),
            buy_price: 5_001_000.0,
            sell_price: 5_099_000.0,
            quantity: 1.0,
            gross_spread: 98_000.0,
            gross_spread_pct: 1.9596,
            gross_profit: 98_000.0,
            fee_breakdown,
            total_fees: fee_breakdown.total(),
            net_profit: 98_000.0 - fee_breakdown.total(),
            net_profit_pct: 1.7515,
            is_profitable_after_fees: true,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_fee_breakdown_total() {
        let breakdown = FeeBreakdown {
            buy_trading_fee: 1.0,
            sell_trading_fee: 2.0,
            jpy_withdrawal_fee: 3.0,
            btc_transfer_fee: 4.0,
        };
        assert_eq!(breakdown.total(), 10.0);
        assert_eq!(FeeBreakdown::default().total(), 0.0);
    }

    #[test]
    fn test_route_label() {
        assert_eq!(sample().route_label(), "bitflyer → coincheck");
    }

    #[test]
    fn test_record_shape() {
        let opp = sample();
        let record = opp.to_record();
        assert_eq!(record.exchange_from, "bitflyer");
        assert_eq!(record.exchange_to, "coincheck");
        assert_eq!(record.gross_difference, 98_000.0);
        assert_eq!(record.total_fees, opp.total_fees);
        assert!(record.is_profitable);
        assert_eq!(record.timestamp, opp.observed_at);
    }
}
