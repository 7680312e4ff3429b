//! Ordered provider fallback.
//!
//! Each provider is tried in turn; the first non-empty table wins. Failures
//! are logged and swallowed, so the caller only ever sees `Fetched` or
//! `Empty`.

use super::alpha_vantage::AlphaVantageProvider;
use super::circuit_breaker::CircuitBreaker;
use super::provider::{PriceProvider, ProviderError, ProviderKind};
use super::raw::RawTable;
use super::yahoo::YahooProvider;
use crate::config::ProvidersConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a full-history fetch across the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched { provider: String, table: RawTable },
    Empty,
}

impl FetchOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, FetchOutcome::Empty)
    }
}

#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn PriceProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority.
    pub fn push(&mut self, provider: Box<dyn PriceProvider>) {
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: impl PriceProvider + 'static) -> Self {
        self.push(Box::new(provider));
        self
    }

    /// Build the chain in configured order. Disabled providers, and Alpha
    /// Vantage without a key, are left out.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let breaker = || {
            Arc::new(CircuitBreaker::new(
                Duration::from_secs(config.circuit_breaker.cooldown_secs),
                config.circuit_breaker.failure_threshold,
            ))
        };

        let mut chain = Self::new();
        for kind in &config.order {
            match kind {
                ProviderKind::AlphaVantage => {
                    let av = &config.alpha_vantage;
                    if !av.enabled {
                        debug!("alpha_vantage disabled in config");
                        continue;
                    }
                    let Some(key) = av.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
                        warn!("alpha_vantage has no API key configured; skipping provider");
                        continue;
                    };
                    chain.push(Box::new(AlphaVantageProvider::new(av, key, breaker())?));
                }
                ProviderKind::Yahoo => {
                    if !config.yahoo.enabled {
                        debug!("yahoo disabled in config");
                        continue;
                    }
                    chain.push(Box::new(YahooProvider::new(&config.yahoo, breaker())?));
                }
            }
        }

        if chain.is_empty() {
            warn!("no price providers enabled; every sync will report no new data");
        }
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Full daily history from the first provider that yields rows.
    pub fn fetch_full_history(&self, instrument_id: &str) -> FetchOutcome {
        for provider in &self.providers {
            let name = provider.name();
            if !provider.is_available() {
                warn!(provider = name, instrument_id, "provider throttled; skipping");
                continue;
            }
            match provider.fetch(instrument_id) {
                Ok(table) if table.is_empty() => {
                    warn!(provider = name, instrument_id, "provider returned no rows");
                }
                Ok(table) => {
                    debug!(provider = name, instrument_id, rows = table.len(), "fetched history");
                    return FetchOutcome::Fetched {
                        provider: name.to_string(),
                        table,
                    };
                }
                Err(e) => {
                    warn!(provider = name, instrument_id, error = %e, "provider fetch failed");
                }
            }
        }
        FetchOutcome::Empty
    }
}
