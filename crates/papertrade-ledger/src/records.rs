//! Row records for the SQLite store.
//!
//! Uuids and timestamps are persisted as TEXT and parsed back at the
//! boundary; a row that fails to parse is a corrupt record, not a silent
//! default.

use std::str::FromStr;

use sqlx::FromRow;
use uuid::Uuid;

use papertrade_core::{Portfolio, StoreError, Symbol, TradeAction, Transaction, UtcDateTime};

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub uuid: String,
    pub portfolio: String,
    pub symbol: String,
    pub action: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub created_at: String,
}

impl TransactionRow {
    pub fn into_transaction(self) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            uuid: parse_uuid("transactions.uuid", &self.uuid)?,
            portfolio: parse_uuid("transactions.portfolio", &self.portfolio)?,
            symbol: Symbol::parse(&self.symbol)
                .map_err(|e| corrupt("transactions.symbol", &self.symbol, &e))?,
            action: TradeAction::from_str(&self.action)
                .map_err(|e| corrupt("transactions.action", &self.action, &e))?,
            quantity: self.quantity,
            price_cents: self.price_cents,
            created_at: UtcDateTime::parse(&self.created_at)
                .map_err(|e| corrupt("transactions.created_at", &self.created_at, &e))?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioRow {
    pub uuid: String,
    pub owner: String,
    pub tournament: Option<String>,
    pub name: String,
    pub balance_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl PortfolioRow {
    pub fn into_portfolio(self) -> Result<Portfolio, StoreError> {
        let tournament = match &self.tournament {
            Some(raw) => Some(parse_uuid("portfolios.tournament", raw)?),
            None => None,
        };

        Ok(Portfolio {
            uuid: parse_uuid("portfolios.uuid", &self.uuid)?,
            owner: parse_uuid("portfolios.owner", &self.owner)?,
            tournament,
            name: self.name,
            balance_cents: self.balance_cents,
            created_at: UtcDateTime::parse(&self.created_at)
                .map_err(|e| corrupt("portfolios.created_at", &self.created_at, &e))?,
            updated_at: UtcDateTime::parse(&self.updated_at)
                .map_err(|e| corrupt("portfolios.updated_at", &self.updated_at, &e))?,
        })
    }
}

fn parse_uuid(column: &str, raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| corrupt(column, raw, &e))
}

fn corrupt(column: &str, raw: &str, error: &dyn std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{column} = '{raw}': {error}"))
}
