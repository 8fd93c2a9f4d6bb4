//! Core data types for the BTC/JPY arbitrage monitor.

pub mod exchange;
pub mod fee;
pub mod opportunity;
pub mod price;

pub use exchange::*;
pub use fee::*;
pub use opportunity::*;
pub use price::*;
