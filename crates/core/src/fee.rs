//! Fee configuration for exchanges.
//!
//! Rates are fractional (`0.001` = 0.1%); negative rates are rebates.
//! Withdrawal fees are fixed absolute amounts per withdrawal.

use crate::{Exchange, ExchangeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order type used when pricing a trading leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Removes liquidity (market order). Arbitrage legs are priced as takers.
    #[default]
    Taker,
    /// Adds liquidity (resting limit order).
    Maker,
}

/// Trading and withdrawal fees for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Taker fee rate (negative means rebate).
    pub taker_fee_rate: f64,
    /// Maker fee rate (negative means rebate).
    pub maker_fee_rate: f64,
    /// Fixed JPY bank withdrawal fee.
    pub jpy_withdrawal_fee: f64,
    /// Fixed BTC withdrawal fee, in BTC.
    pub btc_withdrawal_fee: f64,
}

impl Default for FeeSchedule {
    /// Fallback for exchanges without a registered schedule.
    ///
    /// Never zero: an unknown venue is charged 0.1% per leg,
    /// ¥550 to withdraw JPY and 0.0005 BTC to withdraw coins.
    fn default() -> Self {
        Self {
            taker_fee_rate: 0.001,
            maker_fee_rate: 0.001,
            jpy_withdrawal_fee: 550.0,
            btc_withdrawal_fee: 0.0005,
        }
    }
}

impl FeeSchedule {
    pub fn new(
        taker_fee_rate: f64,
        maker_fee_rate: f64,
        jpy_withdrawal_fee: f64,
        btc_withdrawal_fee: f64,
    ) -> Self {
        Self {
            taker_fee_rate,
            maker_fee_rate,
            jpy_withdrawal_fee,
            btc_withdrawal_fee,
        }
    }

    /// Rate applied for the given order type.
    #[inline]
    pub fn rate(&self, order_type: OrderType) -> f64 {
        match order_type {
            OrderType::Taker => self.taker_fee_rate,
            OrderType::Maker => self.maker_fee_rate,
        }
    }

    /// Published retail schedule for a known exchange.
    pub fn default_for_exchange(exchange: Exchange) -> Self {
        match exchange {
            Exchange::BitFlyer => Self::new(0.0015, 0.0015, 330.0, 0.0004),
            Exchange::Coincheck => Self::new(0.0, 0.0, 407.0, 0.0005),
            Exchange::Zaif => Self::new(0.001, -0.0001, 385.0, 0.0001),
            Exchange::GmoCoin => Self::new(0.0005, -0.0001, 0.0, 0.0),
            Exchange::Bitbank => Self::new(0.0012, -0.0002, 550.0, 0.0006),
        }
    }
}

fn default_network_fee() -> f64 {
    FeeTable::DEFAULT_BTC_NETWORK_FEE
}

/// The fee configuration injected into the fee model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeTable {
    /// Per-exchange schedules.
    #[serde(default)]
    pub schedules: HashMap<ExchangeId, FeeSchedule>,
    /// Schedule used for exchanges missing from `schedules`.
    #[serde(default)]
    pub default_schedule: FeeSchedule,
    /// Fixed on-chain network fee per BTC transfer, in BTC.
    #[serde(default = "default_network_fee")]
    pub btc_network_fee: f64,
}

impl Default for FeeTable {
    fn default() -> Self {
        Self::japan_defaults()
    }
}

impl FeeTable {
    pub const DEFAULT_BTC_NETWORK_FEE: f64 = 0.0001;

    /// Table with no registered schedules: every exchange uses the fallback.
    pub fn empty() -> Self {
        Self {
            schedules: HashMap::new(),
            default_schedule: FeeSchedule::default(),
            btc_network_fee: Self::DEFAULT_BTC_NETWORK_FEE,
        }
    }

    /// Schedules for every exchange with a built-in fetcher.
    pub fn japan_defaults() -> Self {
        let mut table = Self::empty();
        for &exchange in Exchange::all() {
            table
                .schedules
                .insert(exchange.id(), FeeSchedule::default_for_exchange(exchange));
        }
        table
    }

    /// Register or replace the schedule for an exchange.
    pub fn with_schedule(
        mut self,
        exchange: impl Into<ExchangeId>,
        schedule: FeeSchedule,
    ) -> Self {
        self.schedules.insert(exchange.into(), schedule);
        self
    }

    /// Schedule for an exchange, falling back to `default_schedule`.
    pub fn schedule_for(&self, exchange: &ExchangeId) -> &FeeSchedule {
        self.schedules.get(exchange).unwrap_or(&self.default_schedule)
    }

    /// Whether the exchange has its own schedule.
    pub fn is_registered(&self, exchange: &ExchangeId) -> bool {
        self.schedules.contains_key(exchange)
    }
}
