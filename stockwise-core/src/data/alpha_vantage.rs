//! Alpha Vantage provider.
//!
//! `TIME_SERIES_DAILY` with `outputsize=full`. The payload is an object
//! keyed by date whose values carry Alpha Vantage's numbered field names
//! (`1. open` … `5. volume`, all strings); those names are passed through
//! unchanged and the normalizer resolves `4. close` as the close column.
//!
//! Throttling is signalled in-band with HTTP 200: a `Note` body is the
//! per-minute limit, an `Information` body the daily quota or a premium
//! endpoint. The former counts towards the circuit breaker, the latter
//! trips it outright.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{PriceProvider, ProviderError};
use super::raw::{ColumnHeader, RawTable};
use crate::config::AlphaVantageConfig;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct AlphaVantageProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl AlphaVantageProvider {
    pub fn new(
        config: &AlphaVantageConfig,
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            circuit_breaker,
        })
    }

    fn request(&self, symbol: &str) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", "full"),
                ("datatype", "json"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .map_err(|e| ProviderError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            return Err(ProviderError::RateLimited(format!("HTTP 429 for {symbol}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Other(format!("HTTP {status} for {symbol}")));
        }

        resp.json::<Value>().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })
    }

    fn check_in_band_errors(&self, symbol: &str, body: &Value) -> Result<(), ProviderError> {
        match classify_body(body) {
            BodyKind::Series => Ok(()),
            BodyKind::ErrorMessage(msg) => {
                debug!(symbol, %msg, "alpha vantage error message");
                Err(ProviderError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            BodyKind::Note(msg) => {
                self.circuit_breaker.record_failure();
                Err(ProviderError::RateLimited(msg))
            }
            BodyKind::Information(msg) => {
                self.circuit_breaker.trip();
                Err(ProviderError::RateLimited(msg))
            }
            BodyKind::Unknown => Err(ProviderError::ResponseFormatChanged(
                "no time series object in response".into(),
            )),
        }
    }
}

#[derive(Debug, PartialEq)]
enum BodyKind {
    Series,
    ErrorMessage(String),
    Note(String),
    Information(String),
    Unknown,
}

fn classify_body(body: &Value) -> BodyKind {
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    if time_series_object(body).is_some() {
        BodyKind::Series
    } else if let Some(msg) = text("Error Message") {
        BodyKind::ErrorMessage(msg)
    } else if let Some(msg) = text("Note") {
        BodyKind::Note(msg)
    } else if let Some(msg) = text("Information") {
        BodyKind::Information(msg)
    } else {
        BodyKind::Unknown
    }
}

fn time_series_object(body: &Value) -> Option<&Map<String, Value>> {
    body.as_object()?
        .iter()
        .find(|(k, _)| k.starts_with("Time Series"))
        .and_then(|(_, v)| v.as_object())
}

/// Convert a `TIME_SERIES_DAILY` body to a raw table: `date` plus the
/// provider's own field names in first-seen order.
pub fn parse_time_series_body(symbol: &str, body: &Value) -> Result<RawTable, ProviderError> {
    let series = time_series_object(body).ok_or_else(|| {
        ProviderError::ResponseFormatChanged("no time series object in response".into())
    })?;

    let mut field_names: Vec<String> = Vec::new();
    for day in series.values() {
        if let Some(obj) = day.as_object() {
            for key in obj.keys() {
                if !field_names.iter().any(|f| f == key) {
                    field_names.push(key.clone());
                }
            }
        }
    }

    let mut columns = vec![ColumnHeader::single("date")];
    columns.extend(field_names.iter().map(|f| ColumnHeader::single(f.as_str())));
    let mut table = RawTable::new(columns);

    for (date, day) in series {
        let mut row = Vec::with_capacity(field_names.len() + 1);
        row.push(json!(date));
        for name in &field_names {
            row.push(day.get(name).cloned().unwrap_or(Value::Null));
        }
        table.push_row(row);
    }

    if table.is_empty() {
        return Err(ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }
    Ok(table)
}

impl PriceProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch(&self, instrument_id: &str) -> Result<RawTable, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped {
                provider: self.name().to_string(),
            });
        }
        let body = self.request(instrument_id)?;
        self.check_in_band_errors(instrument_id, &body)?;
        let table = parse_time_series_body(instrument_id, &body)?;
        self.circuit_breaker.record_success();
        debug!(instrument_id, rows = table.len(), "alpha vantage history fetched");
        Ok(table)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
