//! Persistence ports for the transaction ledger and portfolio store.
//!
//! One narrow interface per entity, with concrete implementations injected
//! by the application (no process-global state). The compare-and-set on
//! `balance_cents` is the atomicity primitive the trade executor relies on.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use uuid::Uuid;

use crate::{Portfolio, TradeIntent, Transaction};

/// Errors surfaced by ledger and portfolio persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store query error: {0}")]
    Query(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Append-only, ordered record of all executed trades.
///
/// Rows are permanent once appended; `list` returns them ascending by
/// creation, which makes the sequence a replayable event log.
pub trait Ledger: Send + Sync {
    /// Durably record a trade, assigning its uuid and creation instant.
    fn append<'a>(
        &'a self,
        intent: TradeIntent,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>>;

    /// Full transaction history for a portfolio, ascending by creation.
    fn list<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>>;

    /// Paginated slice of a portfolio's history, same ordering as `list`.
    fn list_page<'a>(
        &'a self,
        portfolio: Uuid,
        offset: usize,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>>;

    /// Look up a single transaction by its uuid.
    fn get<'a>(
        &'a self,
        transaction: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>>;
}

/// Portfolio lookup and the balance compare-and-set primitive.
pub trait PortfolioStore: Send + Sync {
    fn get<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Portfolio, StoreError>> + Send + 'a>>;

    /// Atomically replace the balance only if it still equals
    /// `expected_cents`. Returns `false` when another writer got there first.
    fn compare_and_set_balance<'a>(
        &'a self,
        portfolio: Uuid,
        expected_cents: i64,
        new_cents: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>>;
}
