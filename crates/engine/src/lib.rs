//! Arbitrage detection engine.
//!
//! Given the quotes of one polling cycle, this crate enumerates exchange
//! pairs, gates them on gross spread, prices the round trip with the fee
//! model and ranks the resulting opportunities by net profit.

pub mod detector;
pub mod error;
pub mod fee;
pub mod ranking;

pub use detector::*;
pub use error::*;
pub use fee::*;
pub use ranking::*;
