//! Aggregation of raw tick sequences into fixed-width historical buckets.
//!
//! The provider hands back an irregular, ascending-by-time tick stream; this
//! module folds it into contiguous windows of one interval each. Windows
//! with no ticks emit nothing (gaps are skipped, not zero-filled), and a
//! bucket's timestamp is the mean tick instant rather than the window
//! boundary: charting downstream expects the point to sit where the trades
//! actually clustered.

use std::sync::Arc;

use thiserror::Error;

use papertrade_core::{
    HistoricalBucket, Interval, ProviderError, QuoteProvider, Symbol, TickRequest, UtcDateTime,
    ValidationError,
};

/// Failure modes of a historical aggregation.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid aggregation request: {0}")]
    InvalidArgument(#[from] ValidationError),
    #[error("tick provider failed: {0}")]
    Provider(ProviderError),
}

/// Streaming fold from ticks to buckets. Read-only and side-effect-free;
/// always goes to the provider directly, never through the quote cache.
#[derive(Clone)]
pub struct HistoryAggregator {
    provider: Arc<dyn QuoteProvider>,
}

impl HistoryAggregator {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self { provider }
    }

    /// Aggregate ticks in `[start, end)` into buckets of width `interval`.
    ///
    /// `limit` bounds how many raw ticks are requested from the provider;
    /// `offset` skips that many leading ticks before bucketing begins.
    /// Windows are anchored at the first retained tick's timestamp. An empty
    /// tick sequence yields an empty bucket sequence, not an error.
    pub async fn aggregate(
        &self,
        symbol: &Symbol,
        start: UtcDateTime,
        end: UtcDateTime,
        interval: Interval,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoricalBucket>, HistoryError> {
        let request = TickRequest::new(symbol.clone(), start, end, limit)?;
        let ticks = self
            .provider
            .ticks(request)
            .await
            .map_err(HistoryError::Provider)?;

        let width = interval.duration().whole_nanoseconds();
        let mut buckets = Vec::new();
        let mut window: Option<Window> = None;

        for tick in ticks.into_iter().skip(offset) {
            let instant = tick.timestamp.unix_nanos();

            let acc = window.get_or_insert_with(|| Window::anchored_at(instant));

            // Close every window that ends at or before this tick. Empty
            // windows flush to nothing.
            while instant >= acc.start + width {
                if let Some(bucket) = acc.flush(symbol)? {
                    buckets.push(bucket);
                }
                acc.start += width;
            }

            acc.add(tick.price_cents, instant);
        }

        if let Some(mut acc) = window {
            if let Some(bucket) = acc.flush(symbol)? {
                buckets.push(bucket);
            }
        }

        Ok(buckets)
    }
}

/// Accumulator for one in-progress bucket window.
struct Window {
    start: i128,
    count: i64,
    price_sum: i128,
    instant_sum: i128,
}

impl Window {
    fn anchored_at(start: i128) -> Self {
        Self {
            start,
            count: 0,
            price_sum: 0,
            instant_sum: 0,
        }
    }

    fn add(&mut self, price_cents: i64, instant: i128) {
        self.count += 1;
        self.price_sum += i128::from(price_cents);
        self.instant_sum += instant;
    }

    /// Emit the finished bucket, if the window saw any ticks, and clear the
    /// accumulators for the next window.
    fn flush(&mut self, symbol: &Symbol) -> Result<Option<HistoricalBucket>, HistoryError> {
        if self.count == 0 {
            return Ok(None);
        }

        let count = i128::from(self.count);
        // Prices and unix instants are non-negative here, so integer
        // division is the floor the contract asks for.
        let price_cents = (self.price_sum / count) as i64;
        let mean_instant = self.instant_sum / count;

        let bucket = HistoricalBucket {
            symbol: symbol.clone(),
            price_cents,
            timestamp: UtcDateTime::from_unix_nanos(mean_instant)
                .map_err(HistoryError::InvalidArgument)?,
        };

        self.count = 0;
        self.price_sum = 0;
        self.instant_sum = 0;
        Ok(Some(bucket))
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;
    use papertrade_core::{Quote, Tick};

    /// Provider double that serves a scripted tick sequence.
    struct ScriptedTicks {
        ticks: Vec<Tick>,
    }

    impl QuoteProvider for ScriptedTicks {
        fn latest<'a>(
            &'a self,
            symbol: &'a Symbol,
        ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>> {
            Box::pin(async move { Err(ProviderError::not_found(symbol)) })
        }

        fn ticks<'a>(
            &'a self,
            _request: TickRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>> {
            let ticks = self.ticks.clone();
            Box::pin(async move { Ok(ticks) })
        }
    }

    fn symbol() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    fn at(base: UtcDateTime, offset_secs: i64) -> UtcDateTime {
        UtcDateTime::from_unix_nanos(base.unix_nanos() + i128::from(offset_secs) * 1_000_000_000)
            .expect("in range")
    }

    fn tick(price_cents: i64, timestamp: UtcDateTime) -> Tick {
        Tick::new(price_cents, timestamp).expect("valid tick")
    }

    fn aggregator(ticks: Vec<Tick>) -> HistoryAggregator {
        HistoryAggregator::new(Arc::new(ScriptedTicks { ticks }))
    }

    fn range() -> (UtcDateTime, UtcDateTime) {
        (
            UtcDateTime::parse("2024-03-01T15:00:00Z").expect("parses"),
            UtcDateTime::parse("2024-03-01T18:00:00Z").expect("parses"),
        )
    }

    #[tokio::test]
    async fn buckets_average_prices_per_window() {
        let (start, end) = range();
        // One tick in the first 5m window, two in the second.
        let agg = aggregator(vec![
            tick(100, start),
            tick(200, at(start, 300)),
            tick(300, at(start, 301)),
        ]);

        let buckets = agg
            .aggregate(&symbol(), start, end, Interval::FiveMinutes, 1_000, 0)
            .await
            .expect("aggregates");

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].price_cents, 100);
        assert_eq!(buckets[0].timestamp, start);
        assert_eq!(buckets[1].price_cents, 250);
        // Mean of t+300s and t+301s is t+300.5s, not the window boundary.
        let expected = UtcDateTime::from_unix_nanos(
            start.unix_nanos() + 300_500_000_000i128,
        )
        .expect("in range");
        assert_eq!(buckets[1].timestamp, expected);
    }

    #[tokio::test]
    async fn average_price_is_floor_rounded() {
        let (start, end) = range();
        let agg = aggregator(vec![tick(100, start), tick(101, at(start, 1))]);

        let buckets = agg
            .aggregate(&symbol(), start, end, Interval::FiveMinutes, 1_000, 0)
            .await
            .expect("aggregates");

        assert_eq!(buckets.len(), 1);
        // (100 + 101) / 2 floors to 100.
        assert_eq!(buckets[0].price_cents, 100);
    }

    #[tokio::test]
    async fn empty_windows_are_skipped_not_zero_filled() {
        let (start, end) = range();
        // Second tick lands three windows after the first.
        let agg = aggregator(vec![tick(100, start), tick(400, at(start, 3 * 300 + 10))]);

        let buckets = agg
            .aggregate(&symbol(), start, end, Interval::FiveMinutes, 1_000, 0)
            .await
            .expect("aggregates");

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].price_cents, 100);
        assert_eq!(buckets[1].price_cents, 400);
    }

    #[tokio::test]
    async fn offset_skips_leading_ticks_before_anchoring() {
        let (start, end) = range();
        let agg = aggregator(vec![
            tick(100, start),
            tick(200, at(start, 60)),
            tick(300, at(start, 120)),
        ]);

        let buckets = agg
            .aggregate(&symbol(), start, end, Interval::FiveMinutes, 1_000, 1)
            .await
            .expect("aggregates");

        // The window anchors at the second tick; both retained ticks fall in it.
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].price_cents, 250);
    }

    #[tokio::test]
    async fn no_ticks_yield_no_buckets() {
        let (start, end) = range();
        let agg = aggregator(Vec::new());

        let buckets = agg
            .aggregate(&symbol(), start, end, Interval::OneHour, 1_000, 0)
            .await
            .expect("aggregates");

        assert!(buckets.is_empty());
    }

    #[tokio::test]
    async fn inverted_range_is_an_input_error() {
        let (start, end) = range();
        let agg = aggregator(Vec::new());

        let err = agg
            .aggregate(&symbol(), end, start, Interval::OneHour, 1_000, 0)
            .await
            .expect_err("must fail");

        assert!(matches!(err, HistoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn provider_failure_surfaces_untouched() {
        struct Failing;

        impl QuoteProvider for Failing {
            fn latest<'a>(
                &'a self,
                symbol: &'a Symbol,
            ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>>
            {
                Box::pin(async move { Err(ProviderError::not_found(symbol)) })
            }

            fn ticks<'a>(
                &'a self,
                _request: TickRequest,
            ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>>
            {
                Box::pin(async move { Err(ProviderError::unavailable("upstream down")) })
            }
        }

        let (start, end) = range();
        let agg = HistoryAggregator::new(Arc::new(Failing));

        let err = agg
            .aggregate(&symbol(), start, end, Interval::OneHour, 1_000, 0)
            .await
            .expect_err("must fail");

        assert!(matches!(err, HistoryError::Provider(_)));
    }
}
