//! BTC/JPY quote collection from Japanese exchanges.
//!
//! ## Architecture
//!
//! - `rest` - Per-exchange ticker endpoints and pure response parsers
//! - `source` - `QuoteSource` trait and the concurrent REST poller
//! - `simulator` - Deterministic demo source for running offline

pub mod error;
pub mod rest;
pub mod simulator;
pub mod source;

pub use error::*;
pub use rest::*;
pub use simulator::*;
pub use source::*;
