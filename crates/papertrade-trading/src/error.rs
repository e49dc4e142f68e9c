use thiserror::Error;
use uuid::Uuid;

use papertrade_core::{StoreError, Symbol, ValidationError};

use crate::holdings::HoldingsError;

/// Why a trade was refused or could not complete.
///
/// The first five variants are caller-facing rejections of a well-formed
/// request; `BalanceConflict`, `ConsistencyViolation`, and `Store` are
/// operational failures the caller can only retry or report.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("invalid trade request: {0}")]
    InvalidArgument(#[from] ValidationError),
    #[error("portfolio not found: {0}")]
    PortfolioNotFound(Uuid),
    #[error("no usable quote for '{symbol}': {reason}")]
    QuoteUnavailable { symbol: Symbol, reason: String },
    #[error("insufficient funds: required {required} cents, available {available} cents")]
    InsufficientFunds { required: i64, available: i64 },
    #[error("insufficient holdings of '{symbol}': requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: Symbol,
        requested: i64,
        held: i64,
    },
    /// The balance kept changing under us until the retry budget ran out.
    #[error("portfolio balance changed concurrently; trade aborted")]
    BalanceConflict,
    /// The ledger and the balance disagree in a way execution cannot repair.
    #[error("ledger/balance consistency violation: {0}")]
    ConsistencyViolation(String),
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

impl From<HoldingsError> for TradeError {
    fn from(error: HoldingsError) -> Self {
        match error {
            HoldingsError::NegativeQuantity { symbol, quantity } => Self::ConsistencyViolation(
                format!("ledger holds a negative quantity of '{symbol}' ({quantity})"),
            ),
            HoldingsError::Store(store) => Self::Store(store),
        }
    }
}
