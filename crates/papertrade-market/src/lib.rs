//! # Papertrade Market
//!
//! Market-data side of the paper-trading core: the provider adapter, the
//! bounded quote cache, and the historical aggregator.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`alpaca`] | Alpaca data-API adapter implementing `QuoteProvider` |
//! | [`cache`] | Bounded, time-aware quote cache with insertion-order eviction |
//! | [`history`] | Tick-to-bucket aggregation for charting |
//! | [`http_client`] | HTTP transport abstraction (reqwest-backed in production) |
//!
//! ## Failure model
//!
//! Neither the cache nor the aggregator retries provider failures; both
//! surface typed errors immediately and leave retry policy to the caller.
//! Provider calls carry a per-request timeout so a stalled upstream cannot
//! stall trade execution.

pub mod alpaca;
pub mod cache;
pub mod history;
pub mod http_client;

pub use alpaca::{AlpacaConfig, AlpacaQuoteProvider};
pub use cache::{CacheConfig, QuoteCache, QuoteError};
pub use history::{HistoryAggregator, HistoryError};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};
