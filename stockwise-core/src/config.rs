//! Application configuration.
//!
//! One TOML file, every field defaulted. The resulting [`AppConfig`] is
//! passed explicitly into the provider chain, store and sync engine; nothing
//! reads credentials from ambient global state.
//!
//! ```toml
//! [store]
//! path = "data"
//!
//! [sync]
//! epoch_start = "2015-01-01"
//!
//! [providers]
//! order = ["alpha_vantage", "yahoo"]
//!
//! [providers.alpha_vantage]
//! api_key = "..."
//! ```

use crate::data::provider::ProviderKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub providers: ProvidersConfig,
    pub analytics: AnalyticsConfig,
    pub normalizer: NormalizerConfig,
}

impl AppConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analytics;
        if a.window == 0 || a.ema_window == 0 || a.trend_window == 0 {
            return Err(ConfigError::Invalid("analytics windows must be >= 1".into()));
        }
        if !a.abrupt_threshold.is_finite() || a.abrupt_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "abrupt_threshold must be a non-negative number, got {}",
                a.abrupt_threshold
            )));
        }

        let p = &self.providers;
        if p.order.is_empty() {
            return Err(ConfigError::Invalid("providers.order is empty".into()));
        }
        let mut seen = HashSet::new();
        for kind in &p.order {
            if !seen.insert(kind) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' listed twice in providers.order",
                    kind.as_str()
                )));
            }
        }
        if p.alpha_vantage.timeout_secs == 0 || p.yahoo.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider timeout_secs must be >= 1".into()));
        }

        if self.normalizer.header_separator.is_empty() {
            return Err(ConfigError::Invalid("normalizer.header_separator is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the Parquet store.
    pub path: PathBuf,
    /// Create the root directory when it does not exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// First date fetched for an instrument with no stored history.
    pub epoch_start: NaiveDate,
    /// Sync instruments in parallel.
    pub parallel: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            epoch_start: default_epoch_start(),
            parallel: false,
        }
    }
}

pub fn default_epoch_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Fallback order.
    pub order: Vec<ProviderKind>,
    pub alpha_vantage: AlphaVantageConfig,
    pub yahoo: YahooConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: vec![ProviderKind::AlphaVantage, ProviderKind::Yahoo],
            alpha_vantage: AlphaVantageConfig::default(),
            yahoo: YahooConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlphaVantageConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: "https://www.alphavantage.co/query".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YahooConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://query2.finance.yahoo.com/v8/finance/chart".into(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub cooldown_secs: u64,
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30 * 60,
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// SMA and volatility window.
    pub window: usize,
    pub ema_window: usize,
    /// Abrupt-change threshold as a fraction (0.05 = 5%).
    pub abrupt_threshold: f64,
    /// SMA window behind the trend-above-average signal.
    pub trend_window: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window: 20,
            ema_window: 20,
            abrupt_threshold: 0.05,
            trend_window: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Joins multi-level header segments.
    pub header_separator: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            header_separator: "_".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sync.epoch_start, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(
            config.providers.order,
            vec![ProviderKind::AlphaVantage, ProviderKind::Yahoo]
        );
    }

    #[test]
    fn partial_toml_overrides() {
        let config = AppConfig::from_toml(
            r#"
[store]
path = "/var/lib/stockwise"

[sync]
epoch_start = "2020-06-01"

[providers]
order = ["yahoo"]

[providers.alpha_vantage]
api_key = "demo"

[analytics]
abrupt_threshold = 0.1
"#,
        )
        .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/var/lib/stockwise"));
        assert!(config.store.create_if_missing);
        assert_eq!(config.sync.epoch_start, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(config.providers.order, vec![ProviderKind::Yahoo]);
        assert_eq!(config.providers.alpha_vantage.api_key.as_deref(), Some("demo"));
        assert_eq!(config.providers.yahoo.timeout_secs, 30);
        assert_eq!(config.analytics.abrupt_threshold, 0.1);
        assert_eq!(config.analytics.window, 20);
    }

    #[test]
    fn rejects_duplicate_providers() {
        let err = AppConfig::from_toml("[providers]\norder = [\"yahoo\", \"yahoo\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_window() {
        let err = AppConfig::from_toml("[analytics]\nwindow = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = AppConfig::from_toml("[providers]\norder = [\"bloomberg\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
