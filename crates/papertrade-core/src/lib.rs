//! # Papertrade Core
//!
//! Domain contracts and ports for the paper-trading simulation backend.
//!
//! ## Overview
//!
//! This crate provides the foundational pieces shared by the market-data and
//! trading crates:
//!
//! - **Canonical domain models** for quotes, ticks, historical buckets,
//!   transactions, and portfolios (all prices in integer cents)
//! - **Validation** on construction, so invalid values never circulate
//! - **Ports** for the quote provider and the persistence collaborators,
//!   expressed as object-safe traits that concrete adapters implement
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Domain models (Quote, Tick, HistoricalBucket, Transaction, Portfolio) |
//! | [`error`] | Validation error types |
//! | [`provider`] | Quote-provider port and structured provider errors |
//! | [`store`] | Ledger and portfolio-store ports |
//!
//! ## Error Handling
//!
//! All fallible operations return typed errors distinguishable by kind so the
//! transport layer above the core can map them deterministically. Nothing in
//! this crate panics on caller input.

pub mod domain;
pub mod error;
pub mod provider;
pub mod store;

pub use domain::{
    total_cents, HistoricalBucket, Interval, Portfolio, Quote, Symbol, Tick, TickRequest,
    TradeAction, TradeIntent, Transaction, UtcDateTime,
};
pub use error::ValidationError;
pub use provider::{ProviderError, ProviderErrorKind, QuoteProvider};
pub use store::{Ledger, PortfolioStore, StoreError};
