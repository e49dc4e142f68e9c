//! SQLite-backed ledger and portfolio store.
//!
//! One explicitly constructed pool owns the connection lifecycle and is
//! injected wherever persistence is needed; there is no process-global
//! handle. The schema mirrors the two tables the core owns semantically:
//! `portfolios` (mutable cash balance) and `transactions` (append-only).

use std::future::Future;
use std::pin::Pin;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use papertrade_core::{
    Ledger, Portfolio, PortfolioStore, StoreError, TradeIntent, Transaction, UtcDateTime,
};

use crate::records::{PortfolioRow, TransactionRow};
use crate::STARTING_BALANCE_CENTS;

/// Connection settings for the SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// sqlx connection URL, e.g. `sqlite:///var/lib/papertrade/ledger.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

impl SqliteStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }
}

/// Ledger + portfolio persistence over a shared SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database and ensure the schema exists.
    pub async fn open(config: SqliteStoreConfig) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database, mainly for tests and tooling.
    ///
    /// A single connection keeps every query on the same in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolios (
                uuid TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                tournament TEXT,
                name TEXT NOT NULL,
                balance_cents INTEGER NOT NULL CHECK (balance_cents >= 0),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(query_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL UNIQUE,
                portfolio TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(query_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_portfolio ON transactions (portfolio, seq)",
        )
        .execute(pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    /// Create a portfolio with the default starting balance.
    pub async fn create_portfolio(
        &self,
        owner: Uuid,
        name: &str,
        tournament: Option<Uuid>,
    ) -> Result<Portfolio, StoreError> {
        let now = UtcDateTime::now();
        let portfolio = Portfolio {
            uuid: Uuid::new_v4(),
            owner,
            tournament,
            name: name.to_owned(),
            balance_cents: STARTING_BALANCE_CENTS,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO portfolios (uuid, owner, tournament, name, balance_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(portfolio.uuid.to_string())
        .bind(portfolio.owner.to_string())
        .bind(portfolio.tournament.map(|t| t.to_string()))
        .bind(&portfolio.name)
        .bind(portfolio.balance_cents)
        .bind(portfolio.created_at.format_rfc3339())
        .bind(portfolio.updated_at.format_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(portfolio)
    }

    async fn append_inner(&self, intent: TradeIntent) -> Result<Transaction, StoreError> {
        let transaction = Transaction {
            uuid: Uuid::new_v4(),
            portfolio: intent.portfolio,
            symbol: intent.symbol,
            action: intent.action,
            quantity: intent.quantity,
            price_cents: intent.price_cents,
            created_at: UtcDateTime::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (uuid, portfolio, symbol, action, quantity, price_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.uuid.to_string())
        .bind(transaction.portfolio.to_string())
        .bind(transaction.symbol.as_str())
        .bind(transaction.action.as_str())
        .bind(transaction.quantity)
        .bind(transaction.price_cents)
        .bind(transaction.created_at.format_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        debug!(uuid = %transaction.uuid, portfolio = %transaction.portfolio, "appended transaction");
        Ok(transaction)
    }

    async fn list_inner(
        &self,
        portfolio: Uuid,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut sql = String::from(
            "SELECT uuid, portfolio, symbol, action, quantity, price_cents, created_at \
             FROM transactions WHERE portfolio = ? ORDER BY seq",
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query_as::<_, TransactionRow>(&sql).bind(portfolio.to_string());
        if let (Some(limit), Some(offset)) = (limit, offset) {
            query = query.bind(limit as i64).bind(offset as i64);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(query_error)?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    async fn get_transaction_inner(&self, transaction: Uuid) -> Result<Transaction, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT uuid, portfolio, symbol, action, quantity, price_cents, created_at \
             FROM transactions WHERE uuid = ? LIMIT 1",
        )
        .bind(transaction.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.ok_or_else(|| StoreError::NotFound(format!("transaction {transaction}")))?
            .into_transaction()
    }

    async fn get_portfolio_inner(&self, portfolio: Uuid) -> Result<Portfolio, StoreError> {
        let row = sqlx::query_as::<_, PortfolioRow>(
            "SELECT uuid, owner, tournament, name, balance_cents, created_at, updated_at \
             FROM portfolios WHERE uuid = ? LIMIT 1",
        )
        .bind(portfolio.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.ok_or_else(|| StoreError::NotFound(format!("portfolio {portfolio}")))?
            .into_portfolio()
    }

    async fn compare_and_set_inner(
        &self,
        portfolio: Uuid,
        expected_cents: i64,
        new_cents: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE portfolios SET balance_cents = ?, updated_at = ? \
             WHERE uuid = ? AND balance_cents = ?",
        )
        .bind(new_cents)
        .bind(UtcDateTime::now().format_rfc3339())
        .bind(portfolio.to_string())
        .bind(expected_cents)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }
}

impl Ledger for SqliteStore {
    fn append<'a>(
        &'a self,
        intent: TradeIntent,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
        Box::pin(self.append_inner(intent))
    }

    fn list<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>> {
        Box::pin(self.list_inner(portfolio, None, None))
    }

    fn list_page<'a>(
        &'a self,
        portfolio: Uuid,
        offset: usize,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Transaction>, StoreError>> + Send + 'a>> {
        Box::pin(self.list_inner(portfolio, Some(offset), Some(limit)))
    }

    fn get<'a>(
        &'a self,
        transaction: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Transaction, StoreError>> + Send + 'a>> {
        Box::pin(self.get_transaction_inner(transaction))
    }
}

impl PortfolioStore for SqliteStore {
    fn get<'a>(
        &'a self,
        portfolio: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Portfolio, StoreError>> + Send + 'a>> {
        Box::pin(self.get_portfolio_inner(portfolio))
    }

    fn compare_and_set_balance<'a>(
        &'a self,
        portfolio: Uuid,
        expected_cents: i64,
        new_cents: i64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>> {
        Box::pin(self.compare_and_set_inner(portfolio, expected_cents, new_cents))
    }
}

fn query_error(error: sqlx::Error) -> StoreError {
    StoreError::Query(error.to_string())
}
