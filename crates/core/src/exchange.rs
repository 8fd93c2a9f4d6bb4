//! Exchange identifiers.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque exchange identifier as carried by quotes and opportunities.
///
/// Identifiers are lowercase ASCII (e.g. `"bitflyer"`). Any string is
/// accepted so that synthetic or newly added venues can flow through the
/// engine without a code change; the fee model falls back to its default
/// schedule for identifiers it does not know.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ExchangeId(CompactString);

impl<'de> Deserialize<'de> for ExchangeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ExchangeId::new(&raw))
    }
}

impl ExchangeId {
    /// Normalize to lowercase; aliases of known exchanges resolve to their
    /// canonical id (`"GMO"` becomes `"gmocoin"`).
    pub fn new(id: &str) -> Self {
        let id = id.trim().to_ascii_lowercase();
        match Exchange::from_id(&id) {
            Some(exchange) => Self(CompactString::new(exchange.id_str())),
            None => Self(CompactString::new(id)),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Resolve to a known exchange, if any.
    pub fn known(&self) -> Option<Exchange> {
        Exchange::from_id(self.as_str())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ExchangeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<Exchange> for ExchangeId {
    fn from(exchange: Exchange) -> Self {
        exchange.id()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown exchange: {0}")]
pub struct UnknownExchange(pub String);

/// Exchanges with a built-in BTC/JPY ticker fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    BitFlyer,
    Coincheck,
    Zaif,
    GmoCoin,
    Bitbank,
}

impl Exchange {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "bitflyer" => Some(Exchange::BitFlyer),
            "coincheck" => Some(Exchange::Coincheck),
            "zaif" => Some(Exchange::Zaif),
            "gmocoin" | "gmo" => Some(Exchange::GmoCoin),
            "bitbank" => Some(Exchange::Bitbank),
            _ => None,
        }
    }

    /// Stable identifier used in quotes, fee tables and storage.
    pub fn id_str(self) -> &'static str {
        match self {
            Exchange::BitFlyer => "bitflyer",
            Exchange::Coincheck => "coincheck",
            Exchange::Zaif => "zaif",
            Exchange::GmoCoin => "gmocoin",
            Exchange::Bitbank => "bitbank",
        }
    }

    #[inline]
    pub fn id(self) -> ExchangeId {
        ExchangeId::new(self.id_str())
    }

    /// Human readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Exchange::BitFlyer => "bitFlyer",
            Exchange::Coincheck => "Coincheck",
            Exchange::Zaif => "Zaif",
            Exchange::GmoCoin => "GMO Coin",
            Exchange::Bitbank => "bitbank",
        }
    }

    pub fn all() -> &'static [Exchange] {
        &[
            Exchange::BitFlyer,
            Exchange::Coincheck,
            Exchange::Zaif,
            Exchange::GmoCoin,
            Exchange::Bitbank,
        ]
    }
}

impl std::str::FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exchange::from_id(s).ok_or_else(|| UnknownExchange(s.to_string()))
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
