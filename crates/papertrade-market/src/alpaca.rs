//! Alpaca market-data adapter implementing the `QuoteProvider` port.
//!
//! Talks to the Alpaca stocks data API (IEX feed): the latest-trade endpoint
//! for current prices and the historical-trades endpoint for raw ticks.
//! Upstream prices arrive as dollars and are floored to integer cents at the
//! boundary so nothing downstream ever sees a float.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::Deserialize;

use papertrade_core::{
    ProviderError, Quote, QuoteProvider, Symbol, Tick, TickRequest, UtcDateTime,
};

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const DEFAULT_DATA_HOST: &str = "https://data.alpaca.markets";
const DEFAULT_QUOTA_PER_MINUTE: u32 = 200;

/// Connection settings for the Alpaca data API.
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    pub data_host: String,
    pub api_key: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    /// Outbound request budget; exhausted budget fails fast as rate-limited
    /// instead of hitting the upstream quota.
    pub quota_per_minute: u32,
}

impl AlpacaConfig {
    /// Read credentials from the environment, falling back to the paper
    /// "demo" keys so offline tests construct cleanly.
    pub fn from_env() -> Self {
        Self {
            data_host: String::from(DEFAULT_DATA_HOST),
            api_key: std::env::var("PAPERTRADE_ALPACA_API_KEY")
                .unwrap_or_else(|_| String::from("demo")),
            secret_key: std::env::var("PAPERTRADE_ALPACA_SECRET_KEY")
                .unwrap_or_else(|_| String::from("demo")),
            timeout_ms: 3_000,
            quota_per_minute: DEFAULT_QUOTA_PER_MINUTE,
        }
    }
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// `QuoteProvider` backed by the Alpaca stocks data API.
#[derive(Clone)]
pub struct AlpacaQuoteProvider {
    config: AlpacaConfig,
    http_client: Arc<dyn HttpClient>,
    limiter: Arc<DirectRateLimiter>,
}

impl AlpacaQuoteProvider {
    pub fn new(config: AlpacaConfig, http_client: Arc<dyn HttpClient>) -> Self {
        let per_minute =
            NonZeroU32::new(config.quota_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            config,
            http_client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    fn acquire_budget(&self) -> Result<(), ProviderError> {
        self.limiter.check().map_err(|_| {
            ProviderError::rate_limited("alpaca request budget exhausted for this minute")
        })
    }

    async fn execute(&self, url: String) -> Result<HttpResponse, ProviderError> {
        self.acquire_budget()?;

        let request = HttpRequest::get(url)
            .with_header("APCA-API-KEY-ID", &self.config.api_key)
            .with_header("APCA-API-SECRET-KEY", &self.config.secret_key)
            .with_header("accept", "application/json")
            .with_timeout_ms(self.config.timeout_ms);

        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.is_timeout() {
                ProviderError::timeout(format!("alpaca call timed out: {}", error.message()))
            } else {
                ProviderError::unavailable(format!(
                    "alpaca transport error: {}",
                    error.message()
                ))
            }
        })?;

        if response.status == 429 {
            return Err(ProviderError::rate_limited(
                "alpaca upstream rejected the call with 429",
            ));
        }
        if !response.is_success() {
            return Err(ProviderError::unavailable(format!(
                "alpaca upstream returned status {}",
                response.status
            )));
        }

        Ok(response)
    }
}

impl QuoteProvider for AlpacaQuoteProvider {
    fn latest<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/stocks/trades/latest?symbols={}&feed=iex",
                self.config.data_host, symbol
            );

            let response = self.execute(url).await?;
            let payload: LatestTradesPayload =
                serde_json::from_str(&response.body).map_err(|e| {
                    ProviderError::malformed_payload(format!(
                        "alpaca latest-trade payload did not parse: {e}"
                    ))
                })?;

            let trade = payload
                .trades
                .get(symbol.as_str())
                .ok_or_else(|| ProviderError::not_found(symbol))?;

            let timestamp = UtcDateTime::parse(&trade.t).map_err(|e| {
                ProviderError::malformed_payload(format!("alpaca trade timestamp: {e}"))
            })?;

            Quote::new(symbol.clone(), dollars_to_cents(trade.p)?, timestamp).map_err(|e| {
                ProviderError::malformed_payload(format!("alpaca trade price: {e}"))
            })
        })
    }

    fn ticks<'a>(
        &'a self,
        request: TickRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Tick>, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/stocks/trades?symbols={}&start={}&end={}&limit={}&feed=iex&currency=USD",
                self.config.data_host,
                request.symbol,
                urlencoding::encode(&request.start.format_rfc3339()),
                urlencoding::encode(&request.end.format_rfc3339()),
                request.limit,
            );

            let response = self.execute(url).await?;
            let payload: HistoricalTradesPayload =
                serde_json::from_str(&response.body).map_err(|e| {
                    ProviderError::malformed_payload(format!(
                        "alpaca historical-trades payload did not parse: {e}"
                    ))
                })?;

            // An unknown symbol comes back as a missing key, not an error
            // status; an empty tick list is a valid result.
            let raw = match payload.trades.get(request.symbol.as_str()) {
                Some(trades) => trades,
                None => return Ok(Vec::new()),
            };

            let mut ticks = Vec::with_capacity(raw.len());
            for trade in raw {
                let timestamp = UtcDateTime::parse(&trade.t).map_err(|e| {
                    ProviderError::malformed_payload(format!("alpaca tick timestamp: {e}"))
                })?;
                let tick = Tick::new(dollars_to_cents(trade.p)?, timestamp).map_err(|e| {
                    ProviderError::malformed_payload(format!("alpaca tick price: {e}"))
                })?;
                ticks.push(tick);
            }

            Ok(ticks)
        })
    }
}

fn dollars_to_cents(dollars: f64) -> Result<i64, ProviderError> {
    if !dollars.is_finite() || dollars < 0.0 {
        return Err(ProviderError::malformed_payload(format!(
            "alpaca price '{dollars}' is not a non-negative finite number"
        )));
    }
    Ok((dollars * 100.0).floor() as i64)
}

#[derive(Debug, Deserialize)]
struct LatestTradesPayload {
    #[serde(default)]
    trades: HashMap<String, TradePayload>,
}

#[derive(Debug, Deserialize)]
struct HistoricalTradesPayload {
    #[serde(default)]
    trades: HashMap<String, Vec<TradePayload>>,
}

#[derive(Debug, Deserialize)]
struct TradePayload {
    p: f64,
    t: String,
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;
    use crate::http_client::{HttpError, NoopHttpClient};
    use papertrade_core::ProviderErrorKind;

    struct ScriptedHttpClient {
        response: Result<HttpResponse, HttpError>,
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn provider_with(response: Result<HttpResponse, HttpError>) -> AlpacaQuoteProvider {
        AlpacaQuoteProvider::new(
            AlpacaConfig::from_env(),
            Arc::new(ScriptedHttpClient { response }),
        )
    }

    #[tokio::test]
    async fn parses_latest_trade_into_cents() {
        let body = r#"{"trades":{"AAPL":{"p":178.505,"t":"2024-03-01T15:30:00Z"}}}"#;
        let provider = provider_with(Ok(HttpResponse::ok_json(body)));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let quote = provider.latest(&symbol).await.expect("quote parses");

        assert_eq!(quote.price_cents, 17_850);
        assert_eq!(quote.timestamp.format_rfc3339(), "2024-03-01T15:30:00Z");
    }

    #[tokio::test]
    async fn missing_symbol_in_payload_is_not_found() {
        let body = r#"{"trades":{}}"#;
        let provider = provider_with(Ok(HttpResponse::ok_json(body)));

        let symbol = Symbol::parse("MSFT").expect("valid");
        let err = provider.latest(&symbol).await.expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
    }

    #[tokio::test]
    async fn upstream_failure_is_unavailable() {
        let provider = provider_with(Ok(HttpResponse {
            status: 503,
            body: String::new(),
        }));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let err = provider.latest(&symbol).await.expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn transport_timeout_maps_to_timeout_kind() {
        let provider = provider_with(Err(HttpError::timed_out("deadline exceeded")));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let err = provider.latest(&symbol).await.expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::Timeout);
    }

    #[tokio::test]
    async fn empty_noop_body_carries_no_trades() {
        let provider =
            AlpacaQuoteProvider::new(AlpacaConfig::from_env(), Arc::new(NoopHttpClient));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let err = provider.latest(&symbol).await.expect_err("must fail");
        // `{}` parses but carries no trades map entry for the symbol.
        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
    }

    #[tokio::test]
    async fn historical_ticks_parse_in_order() {
        let body = r#"{"trades":{"AAPL":[
            {"p":100.00,"t":"2024-03-01T15:00:00Z"},
            {"p":101.50,"t":"2024-03-01T15:00:30Z"}
        ]}}"#;
        let provider = provider_with(Ok(HttpResponse::ok_json(body)));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let request = TickRequest::new(
            symbol,
            UtcDateTime::parse("2024-03-01T15:00:00Z").expect("parses"),
            UtcDateTime::parse("2024-03-01T16:00:00Z").expect("parses"),
            100,
        )
        .expect("valid request");

        let ticks = provider.ticks(request).await.expect("ticks parse");
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].price_cents, 10_000);
        assert_eq!(ticks[1].price_cents, 10_150);
        assert!(ticks[0].timestamp < ticks[1].timestamp);
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        let provider = provider_with(Ok(HttpResponse {
            status: 429,
            body: String::new(),
        }));

        let symbol = Symbol::parse("AAPL").expect("valid");
        let err = provider.latest(&symbol).await.expect_err("must fail");
        assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
    }
}
