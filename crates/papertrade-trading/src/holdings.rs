//! Holdings derived from the transaction ledger.
//!
//! Holdings are never stored; they are a fold over a portfolio's ordered
//! transaction history. Buys add their quantity, sells subtract it, and the
//! running total for a symbol must never dip below zero. A history that does
//! is corrupt, and the fold refuses to paper over it.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use papertrade_core::{Ledger, StoreError, Symbol};

/// Failure modes of deriving holdings from the ledger.
#[derive(Debug, Error)]
pub enum HoldingsError {
    /// The ordered history sells more of a symbol than it ever bought.
    #[error("ledger holds a negative quantity of '{symbol}' ({quantity})")]
    NegativeQuantity { symbol: Symbol, quantity: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-side projection of a portfolio's positions.
#[derive(Clone)]
pub struct HoldingsView {
    ledger: Arc<dyn Ledger>,
}

impl HoldingsView {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Fold the full history into per-symbol quantities.
    ///
    /// Symbols whose position has returned to zero are dropped from the
    /// result, so the map only lists what the portfolio currently holds.
    pub async fn holdings(&self, portfolio: Uuid) -> Result<HashMap<Symbol, i64>, HoldingsError> {
        let transactions = self.ledger.list(portfolio).await?;

        let mut held: HashMap<Symbol, i64> = HashMap::new();
        for transaction in &transactions {
            let quantity = held.entry(transaction.symbol.clone()).or_insert(0);
            *quantity += transaction.signed_quantity();
            if *quantity < 0 {
                return Err(HoldingsError::NegativeQuantity {
                    symbol: transaction.symbol.clone(),
                    quantity: *quantity,
                });
            }
        }

        held.retain(|_, quantity| *quantity > 0);
        Ok(held)
    }

    /// Current position in one symbol; zero when the portfolio holds none.
    pub async fn quantity_of(
        &self,
        portfolio: Uuid,
        symbol: &Symbol,
    ) -> Result<i64, HoldingsError> {
        Ok(self
            .holdings(portfolio)
            .await?
            .get(symbol)
            .copied()
            .unwrap_or(0))
    }
}
