use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Symbol, UtcDateTime, ValidationError};

/// A single price observation for a symbol at a point in time.
///
/// Immutable once constructed; all prices are integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price_cents: i64,
    pub timestamp: UtcDateTime,
}

impl Quote {
    pub fn new(
        symbol: Symbol,
        price_cents: i64,
        timestamp: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_price(price_cents)?;
        Ok(Self {
            symbol,
            price_cents,
            timestamp,
        })
    }
}

/// One raw trade event from the market-data provider, prior to aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub price_cents: i64,
    pub timestamp: UtcDateTime,
}

impl Tick {
    pub fn new(price_cents: i64, timestamp: UtcDateTime) -> Result<Self, ValidationError> {
        validate_price(price_cents)?;
        Ok(Self {
            price_cents,
            timestamp,
        })
    }
}

/// Aggregated summary of all ticks within one fixed time window.
///
/// `price_cents` is the floor-rounded interval average; `timestamp` is the
/// mean tick instant, not the window boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalBucket {
    pub symbol: Symbol,
    pub price_cents: i64,
    pub timestamp: UtcDateTime,
}

/// Direction of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl Display for TradeAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(ValidationError::InvalidAction {
                value: other.to_owned(),
            }),
        }
    }
}

/// An executed trade as recorded in the append-only ledger.
///
/// `price_cents` is the total transaction value, not the unit price. The
/// ordered per-portfolio sequence of these records is the sole source of
/// truth for holdings; rows are never updated or deleted, corrections are
/// new offsetting entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub uuid: Uuid,
    pub portfolio: Uuid,
    pub symbol: Symbol,
    pub action: TradeAction,
    pub quantity: i64,
    pub price_cents: i64,
    pub created_at: UtcDateTime,
}

impl Transaction {
    /// Contribution of this trade to the holdings fold: buys add the
    /// quantity, sells subtract it.
    pub const fn signed_quantity(&self) -> i64 {
        match self.action {
            TradeAction::Buy => self.quantity,
            TradeAction::Sell => -self.quantity,
        }
    }
}

/// A validated, not-yet-persisted trade handed to `Ledger::append`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeIntent {
    pub portfolio: Uuid,
    pub symbol: Symbol,
    pub action: TradeAction,
    pub quantity: i64,
    pub price_cents: i64,
}

impl TradeIntent {
    pub fn new(
        portfolio: Uuid,
        symbol: Symbol,
        action: TradeAction,
        quantity: i64,
        price_cents: i64,
    ) -> Result<Self, ValidationError> {
        if quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity { quantity });
        }
        validate_price(price_cents)?;

        Ok(Self {
            portfolio,
            symbol,
            action,
            quantity,
            price_cents,
        })
    }
}

/// A user's virtual portfolio.
///
/// `balance_cents` is the only mutable numeric field the core touches; it is
/// updated exclusively as the paired effect of a successfully appended
/// transaction and never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub uuid: Uuid,
    pub owner: Uuid,
    pub tournament: Option<Uuid>,
    pub name: String,
    pub balance_cents: i64,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

/// Request envelope for raw-tick fetches over a half-open time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRequest {
    pub symbol: Symbol,
    pub start: UtcDateTime,
    pub end: UtcDateTime,
    pub limit: usize,
}

impl TickRequest {
    pub fn new(
        symbol: Symbol,
        start: UtcDateTime,
        end: UtcDateTime,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::StartAfterEnd {
                start: start.format_rfc3339(),
                end: end.format_rfc3339(),
            });
        }

        Ok(Self {
            symbol,
            start,
            end,
            limit,
        })
    }
}

fn validate_price(price_cents: i64) -> Result<(), ValidationError> {
    if price_cents < 0 {
        return Err(ValidationError::NegativePrice { price_cents });
    }
    Ok(())
}

/// Scale a unit price by a trade quantity, rejecting overflow.
pub fn total_cents(price_cents: i64, quantity: i64) -> Result<i64, ValidationError> {
    price_cents
        .checked_mul(quantity)
        .ok_or(ValidationError::AmountOverflow {
            price_cents,
            quantity,
        })
}
