use thiserror::Error;

/// Validation and contract errors exposed by `papertrade-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid interval '{value}', expected one of 5m, 15m, 30m, 1h, 1d")]
    InvalidInterval { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("instant {nanos}ns is outside the representable timestamp range")]
    TimestampOutOfRange { nanos: i128 },

    #[error("invalid trade action '{value}', expected BUY or SELL")]
    InvalidAction { value: String },
    #[error("quantity must be positive, got {quantity}")]
    NonPositiveQuantity { quantity: i64 },
    #[error("price must be non-negative, got {price_cents} cents")]
    NegativePrice { price_cents: i64 },

    #[error("time range start '{start}' is after end '{end}'")]
    StartAfterEnd { start: String, end: String },

    #[error("cents value overflows when scaling {price_cents} by {quantity}")]
    AmountOverflow { price_cents: i64, quantity: i64 },
}
