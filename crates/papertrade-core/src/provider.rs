//! Quote-provider port and its structured error.
//!
//! The market-data provider is treated as an unreliable, rate-limited
//! dependency: callers get a typed error immediately and decide themselves
//! whether to retry. Nothing at this layer retries or caches.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{Quote, Symbol, Tick, TickRequest};

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The provider has no quote for the symbol.
    NotFound,
    /// Transport failure or a non-success upstream status.
    Unavailable,
    /// The provider's request budget is exhausted.
    RateLimited,
    /// The upstream call exceeded its deadline.
    Timeout,
    /// The upstream responded with a body the adapter could not interpret.
    MalformedPayload,
    /// The request itself was rejected before leaving the process.
    InvalidRequest,
}

/// Structured provider error surfaced to the cache and aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn not_found(symbol: &Symbol) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: format!("no quote available for '{symbol}'"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::MalformedPayload,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::NotFound => "provider.not_found",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::Timeout => "provider.timeout",
            ProviderErrorKind::MalformedPayload => "provider.malformed_payload",
            ProviderErrorKind::InvalidRequest => "provider.invalid_request",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Market-data provider contract.
///
/// `ticks` returns raw trade events ascending by timestamp over the
/// half-open range `[start, end)`.
pub trait QuoteProvider: Send + Sync {
    /// Latest traded price for a symbol.
    fn latest<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>>;

    /// Raw trade ticks over a time range, ascending by timestamp.
    fn ticks<'a>(
        &'a self,
        request: TickRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>>;
}
