//! Arbitrage opportunity detector.
//!
//! Compares every pair of exchanges in a polling cycle, in both directions,
//! and turns each direction whose gross spread clears the threshold into a
//! fee-evaluated [`Opportunity`].

use crate::{validate_fee_table, ConfigError, FeeModel};
use arbitrage_core::{spread_pct, ExchangeId, Opportunity, Quote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Configuration for the opportunity detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum gross spread, in percent of the buy price. Inclusive.
    pub threshold_pct: f64,
    /// BTC quantity used to price each opportunity.
    pub reference_quantity: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 0.1,
            reference_quantity: 1.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_pct.is_finite() || self.threshold_pct < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold_pct));
        }
        if !self.reference_quantity.is_finite() || self.reference_quantity <= 0.0 {
            return Err(ConfigError::InvalidQuantity(self.reference_quantity));
        }
        Ok(())
    }
}

/// Why a viable-looking direction produced no opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The buy exchange reported an ask of zero (or below).
    DegenerateBuyPrice { ask: f64 },
    /// The fee model could not produce a finite result.
    FeeNotComputable,
}

/// A direction dropped for data-quality reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDirection {
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub reason: SkipReason,
}

/// Output of one detection pass, in detection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub opportunities: Vec<Opportunity>,
    /// Directions skipped for data-quality reasons; the caller logs these.
    pub skipped: Vec<SkippedDirection>,
}

/// Stateless detector: each call depends only on its input quotes, the
/// configuration and the fee table.
#[derive(Debug, Clone)]
pub struct OpportunityDetector {
    config: DetectorConfig,
    fees: FeeModel,
}

impl Default for OpportunityDetector {
    fn default() -> Self {
        Self {
            config: DetectorConfig::default(),
            fees: FeeModel::default(),
        }
    }
}

impl OpportunityDetector {
    /// Create a detector, rejecting invalid configuration up front.
    pub fn new(config: DetectorConfig, fees: FeeModel) -> Result<Self, ConfigError> {
        config.validate()?;
        validate_fee_table(fees.table())?;
        Ok(Self { config, fees })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeModel {
        &self.fees
    }

    /// Detect opportunities, discarding the skip report.
    pub fn detect(&self, quotes: &[Quote], observed_at: DateTime<Utc>) -> Vec<Opportunity> {
        self.scan(quotes, observed_at).opportunities
    }

    /// Evaluate every exchange pair in both directions.
    ///
    /// Pairs are visited in input order (`i < j`), and for each pair the
    /// `i`-buys/`j`-sells direction is evaluated before the reverse one, so
    /// identical input always yields identical output order.
    pub fn scan(&self, quotes: &[Quote], observed_at: DateTime<Utc>) -> DetectionReport {
        let mut report = DetectionReport::default();

        if quotes.iter().filter(|q| q.has_book()).count() < 2 {
            return report;
        }

        for (i, a) in quotes.iter().enumerate() {
            for b in &quotes[i + 1..] {
                if a.exchange == b.exchange {
                    continue;
                }
                self.evaluate_direction(a, b, observed_at, &mut report);
                self.evaluate_direction(b, a, observed_at, &mut report);
            }
        }

        report
    }

    /// Buy at `buy.ask`, sell at `sell.bid`.
    fn evaluate_direction(
        &self,
        buy: &Quote,
        sell: &Quote,
        observed_at: DateTime<Utc>,
        report: &mut DetectionReport,
    ) {
        let (Some(ask), Some(bid)) = (buy.ask, sell.bid) else {
            return;
        };

        if !(ask > 0.0) {
            report.skipped.push(SkippedDirection {
                buy_exchange: buy.exchange.clone(),
                sell_exchange: sell.exchange.clone(),
                reason: SkipReason::DegenerateBuyPrice { ask },
            });
            return;
        }

        if !(ask < bid) {
            return;
        }

        let Some(gross_spread_pct) = spread_pct(ask, bid) else {
            return;
        };
        if gross_spread_pct < self.config.threshold_pct {
            trace!(
                buy = %buy.exchange,
                sell = %sell.exchange,
                gross_spread_pct,
                "Spread below threshold"
            );
            return;
        }

        let quantity = self.config.reference_quantity;
        let Some(cost) = self
            .fees
            .arbitrage_cost(&buy.exchange, &sell.exchange, quantity, ask, bid)
        else {
            report.skipped.push(SkippedDirection {
                buy_exchange: buy.exchange.clone(),
                sell_exchange: sell.exchange.clone(),
                reason: SkipReason::FeeNotComputable,
            });
            return;
        };

        let net_profit_pct = cost.net_profit * 100.0 / (ask * quantity);

        report.opportunities.push(Opportunity {
            buy_exchange: buy.exchange.clone(),
            sell_exchange: sell.exchange.clone(),
            buy_price: ask,
            sell_price: bid,
            quantity,
            gross_spread: bid - ask,
            gross_spread_pct,
            gross_profit: cost.gross_profit,
            fee_breakdown: cost.breakdown,
            total_fees: cost.total_costs,
            net_profit: cost.net_profit,
            net_profit_pct,
            is_profitable_after_fees: cost.net_profit > 0.0,
            observed_at,
        });
    }
}
