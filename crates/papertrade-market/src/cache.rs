//! Bounded, time-aware cache in front of the quote provider.
//!
//! The cache shields trade execution and simple lookups from provider
//! latency and request budgets. Entries expire after a freshness window and
//! the cache holds at most `capacity` symbols, evicting in insertion order:
//! re-setting an existing key re-queues it to the back of the eviction
//! order, it does not touch the entries ahead of it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use papertrade_core::{ProviderError, ProviderErrorKind, Quote, QuoteProvider, Symbol};

const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_FRESHNESS: Duration = Duration::from_secs(15 * 60);

/// Sizing and staleness bounds for the quote cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of symbols held at once.
    pub capacity: usize,
    /// Maximum age before a cached quote must be refetched.
    pub freshness: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            freshness: DEFAULT_FRESHNESS,
        }
    }
}

/// Failure modes of a cached quote lookup.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("no quote found for '{0}'")]
    NotFound(Symbol),
    #[error("quote provider failed: {0}")]
    Provider(ProviderError),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Quote,
    inserted_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    entries: HashMap<Symbol, CacheEntry>,
    order: VecDeque<Symbol>,
    capacity: usize,
    freshness: Duration,
}

impl CacheInner {
    fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: config.capacity.max(1),
            freshness: config.freshness,
        }
    }

    fn fresh(&self, symbol: &Symbol) -> Option<Quote> {
        self.entries.get(symbol).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.freshness {
                Some(entry.quote.clone())
            } else {
                None
            }
        })
    }

    fn insert(&mut self, symbol: Symbol, quote: Quote) {
        if self.entries.contains_key(&symbol) {
            // Re-set: drop the key from its current slot and re-queue it at
            // the back; everything ahead keeps its position.
            self.order.retain(|queued| queued != &symbol);
        } else if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
                debug!(symbol = %evicted, "evicted oldest-inserted quote");
            }
        }

        self.order.push_back(symbol.clone());
        self.entries.insert(
            symbol,
            CacheEntry {
                quote,
                inserted_at: Instant::now(),
            },
        );
    }

    fn remove(&mut self, symbol: &Symbol) {
        if self.entries.remove(symbol).is_some() {
            self.order.retain(|queued| queued != symbol);
        }
    }
}

/// Thread-safe bounded quote cache.
///
/// Mutation of the map and eviction queue is serialized behind one lock; the
/// lock is released across the provider await, so fetches for distinct
/// symbols proceed independently.
#[derive(Clone)]
pub struct QuoteCache {
    inner: Arc<RwLock<CacheInner>>,
    provider: Arc<dyn QuoteProvider>,
}

impl QuoteCache {
    pub fn new(config: CacheConfig, provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::new(&config))),
            provider,
        }
    }

    pub fn with_defaults(provider: Arc<dyn QuoteProvider>) -> Self {
        Self::new(CacheConfig::default(), provider)
    }

    /// Return a fresh cached quote, or refetch from the provider.
    ///
    /// Provider failures are not retried here and nothing is cached on
    /// failure; any stale entry stays in place for a later refetch attempt.
    pub async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, QuoteError> {
        {
            let inner = self.inner.read().await;
            if let Some(quote) = inner.fresh(symbol) {
                debug!(%symbol, "quote cache hit");
                return Ok(quote);
            }
        }

        debug!(%symbol, "quote cache miss; fetching from provider");
        let quote = self
            .provider
            .latest(symbol)
            .await
            .map_err(|error| match error.kind() {
                ProviderErrorKind::NotFound => QuoteError::NotFound(symbol.clone()),
                _ => QuoteError::Provider(error),
            })?;

        let mut inner = self.inner.write().await;
        inner.insert(symbol.clone(), quote.clone());
        Ok(quote)
    }

    /// Drop an entry immediately. Administrative/testing hook.
    pub async fn invalidate(&self, symbol: &Symbol) {
        let mut inner = self.inner.write().await;
        inner.remove(symbol);
    }

    /// Number of symbols currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a symbol is currently held (fresh or stale).
    pub async fn contains(&self, symbol: &Symbol) -> bool {
        self.inner.read().await.entries.contains_key(symbol)
    }
}
