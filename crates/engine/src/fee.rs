//! Round-trip fee model.
//!
//! Prices a buy on one exchange, a sell on another, and the transfers that
//! close the loop: BTC moves from the buy exchange to the sell exchange and
//! JPY is withdrawn from the sell exchange. All amounts are JPY unless the
//! field says otherwise.

use crate::error::ConfigError;
use arbitrage_core::{ExchangeId, FeeBreakdown, FeeSchedule, FeeTable, OrderType, TradeSide};
use serde::{Deserialize, Serialize};

/// Reject fee tables that would produce non-finite or understated costs.
///
/// Rates must be finite (negative rates are rebates). Fixed withdrawal fees
/// and the network fee must be finite and non-negative. The fallback schedule
/// is checked as `"default"`.
pub fn validate_fee_table(table: &FeeTable) -> Result<(), ConfigError> {
    let network_fee = table.btc_network_fee;
    if !network_fee.is_finite() || network_fee < 0.0 {
        return Err(ConfigError::InvalidNetworkFee(network_fee));
    }

    validate_schedule("default", &table.default_schedule)?;
    for (exchange, schedule) in &table.schedules {
        validate_schedule(exchange.as_str(), schedule)?;
    }
    Ok(())
}

fn validate_schedule(exchange: &str, schedule: &FeeSchedule) -> Result<(), ConfigError> {
    let invalid = |field, requirement, value| ConfigError::InvalidFeeSchedule {
        exchange: exchange.to_string(),
        field,
        requirement,
        value,
    };

    for (field, rate) in [
        ("taker_fee_rate", schedule.taker_fee_rate),
        ("maker_fee_rate", schedule.maker_fee_rate),
    ] {
        if !rate.is_finite() {
            return Err(invalid(field, "finite", rate));
        }
    }
    for (field, fee) in [
        ("jpy_withdrawal_fee", schedule.jpy_withdrawal_fee),
        ("btc_withdrawal_fee", schedule.btc_withdrawal_fee),
    ] {
        if !fee.is_finite() || fee < 0.0 {
            return Err(invalid(field, "finite and non-negative", fee));
        }
    }
    Ok(())
}

/// Cost of a single trading leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingCost {
    /// `quantity * price`.
    pub trade_value: f64,
    /// Signed rate from the schedule.
    pub fee_rate: f64,
    /// `|trade_value * fee_rate|`.
    pub fee_amount: f64,
}

impl TradingCost {
    /// Net cash value of the leg: what a buy costs in total, or what a sell
    /// actually pays out.
    pub fn net_value(&self, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => self.trade_value + self.fee_amount,
            TradeSide::Sell => self.trade_value - self.fee_amount,
        }
    }
}

/// Fee-adjusted result of a buy-sell-withdraw cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageCost {
    pub quantity: f64,
    /// `(sell_price - buy_price) * quantity`.
    pub gross_profit: f64,
    pub total_costs: f64,
    /// `gross_profit - total_costs`.
    pub net_profit: f64,
    pub buy_fee_rate: f64,
    pub sell_fee_rate: f64,
    /// BTC lost in transit (withdrawal fee plus network fee).
    pub btc_transfer_amount: f64,
    pub breakdown: FeeBreakdown,
}

/// Fee model over an injected fee table.
#[derive(Debug, Clone)]
pub struct FeeModel {
    table: FeeTable,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self::new(FeeTable::japan_defaults())
    }
}

impl FeeModel {
    pub fn new(table: FeeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &FeeTable {
        &self.table
    }

    /// Schedule for an exchange, or the table's fallback schedule.
    pub fn schedule_for(&self, exchange: &ExchangeId) -> &FeeSchedule {
        self.table.schedule_for(exchange)
    }

    /// Trading fee for one leg.
    ///
    /// The fee is the absolute value of `trade_value * rate`, so a rebate
    /// rate is never booked as income.
    pub fn trading_cost(
        &self,
        exchange: &ExchangeId,
        quantity: f64,
        price: f64,
        order_type: OrderType,
    ) -> TradingCost {
        let fee_rate = self.schedule_for(exchange).rate(order_type);
        let trade_value = quantity * price;
        TradingCost {
            trade_value,
            fee_rate,
            fee_amount: (trade_value * fee_rate).abs(),
        }
    }

    /// BTC deducted when moving coins off `exchange`, in BTC.
    pub fn btc_transfer_amount(&self, exchange: &ExchangeId) -> f64 {
        self.schedule_for(exchange).btc_withdrawal_fee + self.table.btc_network_fee
    }

    /// Price a complete arbitrage round trip.
    ///
    /// Both legs are priced as taker orders. Returns `None` for a zero or
    /// negative buy price, non-finite inputs, or when the costs or net profit
    /// come out non-finite.
    pub fn arbitrage_cost(
        &self,
        buy_exchange: &ExchangeId,
        sell_exchange: &ExchangeId,
        quantity: f64,
        buy_price: f64,
        sell_price: f64,
    ) -> Option<ArbitrageCost> {
        if !(buy_price > 0.0)
            || !buy_price.is_finite()
            || !sell_price.is_finite()
            || !quantity.is_finite()
        {
            return None;
        }

        let buy_leg = self.trading_cost(buy_exchange, quantity, buy_price, OrderType::Taker);
        let sell_leg = self.trading_cost(sell_exchange, quantity, sell_price, OrderType::Taker);
        let btc_transfer_amount = self.btc_transfer_amount(buy_exchange);

        let breakdown = FeeBreakdown {
            buy_trading_fee: buy_leg.fee_amount,
            sell_trading_fee: sell_leg.fee_amount,
            jpy_withdrawal_fee: self.schedule_for(sell_exchange).jpy_withdrawal_fee,
            btc_transfer_fee: btc_transfer_amount * buy_price,
        };

        let gross_profit = (sell_price - buy_price) * quantity;
        let total_costs = breakdown.total();
        let net_profit = gross_profit - total_costs;
        if !total_costs.is_finite() || !net_profit.is_finite() {
            return None;
        }

        Some(ArbitrageCost {
            quantity,
            gross_profit,
            total_costs,
            net_profit,
            buy_fee_rate: buy_leg.fee_rate,
            sell_fee_rate: sell_leg.fee_rate,
            btc_transfer_amount,
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitrage_core::Exchange;
    use pretty_assertions::assert_eq;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn flat_table() -> FeeTable {
        FeeTable {
            btc_network_fee: 0.0001,
            ..FeeTable::empty()
        }
        .with_schedule("alpha", FeeSchedule::new(0.001, -0.0002, 300.0, 0.0005))
        .with_schedule("beta", FeeSchedule::new(0.002, 0.0, 500.0, 0.0004))
    }

    #[test]
    fn test_trading_cost_taker() {
        let model = FeeModel::new(flat_table());
        let cost = model.trading_cost(&"alpha".into(), 1.0, 5_000_000.0, OrderType::Taker);
        assert_eq!(cost.trade_value, 5_000_000.0);
        assert_eq!(cost.fee_rate, 0.001);
        assert!(approx(cost.fee_amount, 5_000.0));
        assert!(approx(cost.net_value(TradeSide::Buy), 5_005_000.0));
        assert!(approx(cost.net_value(TradeSide::Sell), 4_995_000.0));
    }

    #[test]
    fn test_trading_cost_rebate_is_absolute() {
        let model = FeeModel::new(flat_table());
        let cost = model.trading_cost(&"alpha".into(), 2.0, 5_000_000.0, OrderType::Maker);
        assert_eq!(cost.fee_rate, -0.0002);
        assert!(approx(cost.fee_amount, 2_000.0));
    }

    #[test]
    fn test_unknown_exchange_uses_fallback() {
        let model = FeeModel::new(flat_table());
        let cost = model.trading_cost(&"unlisted".into(), 1.0, 1_000_000.0, OrderType::Taker);
        assert_eq!(cost.fee_rate, FeeSchedule::default().taker_fee_rate);
        assert!(approx(cost.fee_amount, 1_000.0));
        assert_eq!(
            model.btc_transfer_amount(&"unlisted".into()),
            FeeSchedule::default().btc_withdrawal_fee + 0.0001
        );
    }

    #[test]
    fn test_arbitrage_cost_breakdown() {
        let model = FeeModel::new(flat_table());
        let cost = model
            .arbitrage_cost(&"alpha".into(), &"beta".into(), 1.0, 4_000_000.0, 4_100_000.0)
            .unwrap();

        assert_eq!(cost.gross_profit, 100_000.0);
        assert!(approx(cost.breakdown.buy_trading_fee, 4_000.0));
        assert!(approx(cost.breakdown.sell_trading_fee, 8_200.0));
        // JPY is withdrawn from the sell exchange.
        assert_eq!(cost.breakdown.jpy_withdrawal_fee, 500.0);
        // BTC leaves the buy exchange: (0.0005 + 0.0001) BTC at the buy price.
        assert!(approx(cost.breakdown.btc_transfer_fee, 2_400.0));
        assert_eq!(cost.total_costs, cost.breakdown.total());
        assert_eq!(cost.net_profit, cost.gross_profit - cost.total_costs);
        assert_eq!(cost.buy_fee_rate, 0.001);
        assert_eq!(cost.sell_fee_rate, 0.002);
    }

    #[test]
    fn test_arbitrage_cost_scales_trading_fees_with_quantity() {
        let model = FeeModel::new(flat_table());
        let one = model
            .arbitrage_cost(&"alpha".into(), &"beta".into(), 1.0, 4_000_000.0, 4_100_000.0)
            .unwrap();
        let two = model
            .arbitrage_cost(&"alpha".into(), &"beta".into(), 2.0, 4_000_000.0, 4_100_000.0)
            .unwrap();

        assert_eq!(two.gross_profit, 2.0 * one.gross_profit);
        assert!(approx(two.breakdown.buy_trading_fee, 2.0 * one.breakdown.buy_trading_fee));
        // Withdrawal fees are fixed per transfer.
        assert_eq!(two.breakdown.jpy_withdrawal_fee, one.breakdown.jpy_withdrawal_fee);
        assert_eq!(two.breakdown.btc_transfer_fee, one.breakdown.btc_transfer_fee);
    }

    #[test]
    fn test_arbitrage_cost_rejects_degenerate_buy_price() {
        let model = FeeModel::default();
        let buy = Exchange::Zaif.id();
        let sell = Exchange::Bitbank.id();
        assert_eq!(model.arbitrage_cost(&buy, &sell, 1.0, 0.0, 5_000_000.0), None);
        assert_eq!(model.arbitrage_cost(&buy, &sell, 1.0, -1.0, 5_000_000.0), None);
        assert_eq!(model.arbitrage_cost(&buy, &sell, 1.0, f64::NAN, 5_000_000.0), None);
        assert_eq!(model.arbitrage_cost(&buy, &sell, 1.0, 5_000_000.0, f64::INFINITY), None);
    }

    #[test]
    fn test_arbitrage_cost_rejects_overflowing_result() {
        let model = FeeModel::new(flat_table());
        let cost = model.arbitrage_cost(&"alpha".into(), &"beta".into(), 10.0, 1e307, 1.7e308);
        assert_eq!(cost, None);
    }

    #[test]
    fn test_validate_fee_table() {
        assert_eq!(validate_fee_table(&FeeTable::japan_defaults()), Ok(()));
        assert_eq!(validate_fee_table(&flat_table()), Ok(()));

        let nan_rate =
            flat_table().with_schedule("alpha", FeeSchedule::new(f64::NAN, 0.0, 0.0, 0.0));
        assert!(matches!(
            validate_fee_table(&nan_rate),
            Err(ConfigError::InvalidFeeSchedule { exchange, field: "taker_fee_rate", .. })
                if exchange == "alpha"
        ));

        let negative_withdrawal =
            flat_table().with_schedule("beta", FeeSchedule::new(0.001, 0.0, -200_000.0, 0.0));
        assert!(matches!(
            validate_fee_table(&negative_withdrawal),
            Err(ConfigError::InvalidFeeSchedule { field: "jpy_withdrawal_fee", .. })
        ));

        let mut bad_default = flat_table();
        bad_default.default_schedule.btc_withdrawal_fee = f64::INFINITY;
        assert!(matches!(
            validate_fee_table(&bad_default),
            Err(ConfigError::InvalidFeeSchedule { exchange, field: "btc_withdrawal_fee", .. })
                if exchange == "default"
        ));

        let bad_network = FeeTable {
            btc_network_fee: -0.1,
            ..flat_table()
        };
        assert_eq!(
            validate_fee_table(&bad_network),
            Err(ConfigError::InvalidNetworkFee(-0.1))
        );
    }

    #[test]
    fn test_default_model_has_japan_schedules() {
        let model = FeeModel::default();
        let gmo = model.schedule_for(&Exchange::GmoCoin.id());
        assert_eq!(gmo, &FeeSchedule::default_for_exchange(Exchange::GmoCoin));
    }
}
