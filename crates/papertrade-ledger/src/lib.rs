//! # Papertrade Ledger
//!
//! Persistence for the paper-trading core: the append-only transaction
//! ledger and the portfolio store, with a SQLite implementation for
//! production and an in-memory one for tests.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`memory`] | In-memory `Ledger` and `PortfolioStore` |
//! | [`records`] | Row records and parse-at-the-boundary conversions |
//! | [`sqlite`] | SQLite-backed store over a shared `sqlx` pool |
//!
//! ## Ordering
//!
//! Transactions never change once written. Both stores return a
//! portfolio's transactions in append order, which is what makes the
//! holdings fold deterministic.

pub mod memory;
pub mod records;
pub mod sqlite;

pub use memory::{MemoryLedger, MemoryPortfolioStore};
pub use sqlite::{SqliteStore, SqliteStoreConfig};

/// Cash every new portfolio starts with, in cents.
pub const STARTING_BALANCE_CENTS: i64 = 50_000;
