//! Yahoo Finance provider.
//!
//! Fetches the full daily history from Yahoo's v8 chart API (`range=max`).
//! Yahoo has no official API and changes format without notice; every parse
//! failure maps to `ResponseFormatChanged` so the chain can fall back.
//!
//! One request per call. Throttling responses feed the circuit breaker.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{PriceProvider, ProviderError};
use super::raw::RawTable;
use crate::config::YahooConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Output column order.
pub const YAHOO_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "adj_close", "volume"];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl YahooProvider {
    pub fn new(
        config: &YahooConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            circuit_breaker,
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/{symbol}", self.base_url)
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<RawTable, ProviderError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| ProviderError::ResponseFormatChanged("no timestamps".into()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut table = RawTable::with_columns(&YAHOO_COLUMNS);

        for (i, &ts) in timestamps.iter().enumerate() {
            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();
            let adj_close = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

            // Holidays come back as all-null quotes
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            table.push_row(vec![
                json!(ts),
                json!(open),
                json!(high),
                json!(low),
                json!(close),
                json!(adj_close),
                json!(volume),
            ]);
        }

        if table.is_empty() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(table)
    }

    fn request(&self, symbol: &str) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(self.chart_url(symbol))
            .query(&[
                ("range", "max"),
                ("interval", "1d"),
                ("includeAdjustedClose", "true"),
            ])
            .send()
            .map_err(|e| ProviderError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(ProviderError::CircuitBreakerTripped {
                provider: self.name().to_string(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            return Err(ProviderError::RateLimited(format!("HTTP 429 for {symbol}")));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }
        // 404 still carries a chart error body worth parsing
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::Other(format!("HTTP {status} for {symbol}")));
        }

        resp.json::<Value>().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })
    }
}

/// Parse a raw chart API body. Exposed for fixtures and tests.
pub fn parse_chart_body(symbol: &str, body: Value) -> Result<RawTable, ProviderError> {
    let chart: ChartResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("chart body: {e}")))?;
    YahooProvider::parse_response(symbol, chart)
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(&self, instrument_id: &str) -> Result<RawTable, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped {
                provider: self.name().to_string(),
            });
        }
        let body = self.request(instrument_id)?;
        let table = parse_chart_body(instrument_id, body)?;
        self.circuit_breaker.record_success();
        debug!(instrument_id, rows = table.len(), "yahoo history fetched");
        Ok(table)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
