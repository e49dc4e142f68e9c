//! In-memory ledger and portfolio store.
//!
//! Reference implementations of the persistence ports: a transaction arena
//! ordered by insertion and a portfolio map with the same compare-and-set
//! semantics as the SQLite store. Used by unit and behavior tests, and
//! handy for local tooling that should not touch a database file.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use uuid::Uuid;

use papertrade_core::{
    Ledger, Portfolio, PortfolioStore, StoreError, TradeIntent, Transaction, UtcDateTime,
};

use crate::STARTING_BALANCE_CENTS;

/// Append-only in-memory transaction arena.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<Vec<Transaction>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Transaction>> {
        self.inner
            .lock()
            .expect("ledger arena mutex should not be poisoned")
    }
}

impl Ledger for MemoryLedger {
    fn append<'a>(
        &'a self,
        intent: TradeIntent,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let transaction = Transaction {
                uuid: Uuid::new_v4(),
                portfolio: intent.portfolio,
                symbol: intent.symbol,
                action: intent.action,
                quantity: intent.quantity,
                price_cents: intent.price_cents,
                created_at: UtcDateTime::now(),
            };

            self.lock().push(transaction.clone());
            Ok(transaction)
        })
    }

    fn list<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let arena = self.lock();
            Ok(arena
                .iter()
                .filter(|tx| tx.portfolio == portfolio)
                .cloned()
                .collect())
        })
    }

    fn list_page<'a>(
        &'a self,
        portfolio: Uuid,
        offset: usize,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let arena = self.lock();
            Ok(arena
                .iter()
                .filter(|tx| tx.portfolio == portfolio)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn get<'a>(
        &'a self,
        transaction: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let arena = self.lock();
            arena
                .iter()
                .find(|tx| tx.uuid == transaction)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("transaction {transaction}")))
        })
    }
}

/// In-memory portfolio map with compare-and-set balance updates.
#[derive(Debug, Default)]
pub struct MemoryPortfolioStore {
    inner: Mutex<HashMap<Uuid, Portfolio>>,
}

impl MemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Portfolio>> {
        self.inner
            .lock()
            .expect("portfolio map mutex should not be poisoned")
    }

    /// Create a portfolio with the default starting balance.
    pub fn create_portfolio(&self, owner: Uuid, name: &str, tournament: Option<Uuid>) -> Portfolio {
        self.create_portfolio_with_balance(owner, name, tournament, STARTING_BALANCE_CENTS)
    }

    /// Create a portfolio with an explicit starting balance; test scenarios
    /// often need a specific figure.
    pub fn create_portfolio_with_balance(
        &self,
        owner: Uuid,
        name: &str,
        tournament: Option<Uuid>,
        balance_cents: i64,
    ) -> Portfolio {
        let now = UtcDateTime::now();
        let portfolio = Portfolio {
            uuid: Uuid::new_v4(),
            owner,
            tournament,
            name: name.to_owned(),
            balance_cents,
            created_at: now,
            updated_at: now,
        };

        self.lock().insert(portfolio.uuid, portfolio.clone());
        portfolio
    }
}

impl PortfolioStore for MemoryPortfolioStore {
    fn get<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Portfolio, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let map = self.lock();
            map.get(&portfolio)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("portfolio {portfolio}")))
        })
    }

    fn compare_and_set_balance<'a>(
        &'a self,
        portfolio: Uuid,
        expected_cents: i64,
        new_cents: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut map = self.lock();
            let entry = map
                .get_mut(&portfolio)
                .ok_or_else(|| StoreError::NotFound(format!("portfolio {portfolio}")))?;

            if entry.balance_cents != expected_cents {
                return Ok(false);
            }

            entry.balance_cents = new_cents;
            entry.updated_at = UtcDateTime::now();
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrade_core::{Symbol, TradeAction};

    fn intent(portfolio: Uuid, quantity: i64) -> TradeIntent {
        TradeIntent::new(
            portfolio,
            Symbol::parse("AAPL").expect("valid"),
            TradeAction::Buy,
            quantity,
            quantity * 100,
        )
        .expect("valid intent")
    }

    #[tokio::test]
    async fn list_preserves_append_order() {
        let ledger = MemoryLedger::new();
        let portfolio = Uuid::new_v4();

        for quantity in 1..=3 {
            ledger.append(intent(portfolio, quantity)).await.expect("appends");
        }

        let listed = ledger.list(portfolio).await.expect("lists");
        let quantities: Vec<i64> = listed.iter().map(|tx| tx.quantity).collect();
        assert_eq!(quantities, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_page_slices_the_sequence() {
        let ledger = MemoryLedger::new();
        let portfolio = Uuid::new_v4();

        for quantity in 1..=5 {
            ledger.append(intent(portfolio, quantity)).await.expect("appends");
        }

        let page = ledger.list_page(portfolio, 1, 2).await.expect("pages");
        let quantities: Vec<i64> = page.iter().map(|tx| tx.quantity).collect();
        assert_eq!(quantities, vec![2, 3]);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_expectations() {
        let store = MemoryPortfolioStore::new();
        let portfolio = store.create_portfolio_with_balance(Uuid::new_v4(), "p", None, 1_000);

        let applied = store
            .compare_and_set_balance(portfolio.uuid, 1_000, 300)
            .await
            .expect("cas runs");
        assert!(applied);

        let stale = store
            .compare_and_set_balance(portfolio.uuid, 1_000, 0)
            .await
            .expect("cas runs");
        assert!(!stale);

        let current = store.get(portfolio.uuid).await.expect("exists");
        assert_eq!(current.balance_cents, 300);
    }
}
