//! History persistence for quotes and detected opportunities.
//!
//! Quotes and opportunities are written to SQLite by a worker that runs
//! apart from the detection loop, and can be exported as CSV.

pub mod db;
pub mod export;
pub mod sink;

pub use db::*;
pub use export::*;
pub use sink::*;
