//! Error types for engine configuration.

use thiserror::Error;

/// Invalid detector configuration, reported when the engine is built.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Threshold must be a finite, non-negative percentage (got {0})")]
    InvalidThreshold(f64),

    #[error("Reference quantity must be a finite, positive BTC amount (got {0})")]
    InvalidQuantity(f64),

    #[error("BTC network fee must be finite and non-negative (got {0})")]
    InvalidNetworkFee(f64),

    #[error("Fee schedule for {exchange}: {field} must be {requirement} (got {value})")]
    InvalidFeeSchedule {
        exchange: String,
        field: &'static str,
        requirement: &'static str,
        value: f64,
    },
}
