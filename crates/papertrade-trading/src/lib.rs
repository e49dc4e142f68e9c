//! # Papertrade Trading
//!
//! Trade execution and the ledger-derived holdings view.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Trade failure taxonomy |
//! | [`executor`] | Atomic buy/sell execution against the quote cache |
//! | [`holdings`] | Holdings as a fold over the transaction ledger |
//!
//! ## Atomicity
//!
//! Balance changes and ledger appends are paired: a trade either debits (or
//! credits) the portfolio and appends exactly one transaction, or it leaves
//! both untouched. Execution for a given portfolio is serialized; the
//! compare-and-set on the balance additionally guards against writers
//! outside this process.

pub mod error;
pub mod executor;
pub mod holdings;

pub use error::TradeError;
pub use executor::TradeExecutor;
pub use holdings::{HoldingsError, HoldingsView};
