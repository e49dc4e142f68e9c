//! Canonical domain types for the paper-trading core.

mod interval;
mod models;
mod symbol;
mod timestamp;

pub use interval::Interval;
pub use models::{
    total_cents, HistoricalBucket, Portfolio, Quote, Tick, TickRequest, TradeAction, TradeIntent,
    Transaction,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
