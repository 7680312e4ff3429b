//! Price provider trait and structured error types.
//!
//! A `PriceProvider` returns the full daily history of one instrument as a
//! [`RawTable`]. Providers never see the store or the normalizer; the
//! [`ProviderChain`](super::fetcher::ProviderChain) sits above them.

use super::raw::RawTable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured provider failures.
///
/// Every variant is recovered by falling back to the next provider; none of
/// them escapes the fetcher.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider unavailable: circuit breaker open for {provider}")]
    CircuitBreakerTripped { provider: String },

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Which provider implementation a config entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AlphaVantage,
    Yahoo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AlphaVantage => "alpha_vantage",
            ProviderKind::Yahoo => "yahoo",
        }
    }
}

/// A source of full daily history for an instrument.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch the full daily history for `instrument_id`.
    fn fetch(&self, instrument_id: &str) -> Result<RawTable, ProviderError>;

    /// False while the provider is throttled or blocked.
    fn is_available(&self) -> bool {
        true
    }
}
