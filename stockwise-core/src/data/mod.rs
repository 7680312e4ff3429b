//! Data acquisition: providers, fallback chain and normalization.

pub mod alpha_vantage;
pub mod canonicalize;
pub mod circuit_breaker;
pub mod fetcher;
pub mod instruments;
pub mod normalize;
pub mod provider;
pub mod raw;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageProvider;
pub use canonicalize::Canonicalizer;
pub use circuit_breaker::CircuitBreaker;
pub use fetcher::{FetchOutcome, ProviderChain};
pub use instruments::{InstrumentEntry, InstrumentList};
pub use normalize::{ColumnNormalizer, SchemaError};
pub use provider::{PriceProvider, ProviderError, ProviderKind};
pub use raw::{ColumnHeader, RawTable};
pub use yahoo::YahooProvider;
