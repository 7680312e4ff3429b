//! Stockwise Core: daily price history sync, storage and analytics.
//!
//! - Provider chain with ordered fallback (Alpha Vantage, Yahoo Finance)
//! - Column normalizer for heterogeneous provider payloads
//! - Incremental, idempotent sync into a partitioned Parquet store
//! - Ranged series reads
//! - Moving averages, abrupt changes, volatility/risk, alignment and
//!   correlation
//! - CSV export

pub mod analytics;
pub mod config;
pub mod data;
pub mod domain;
pub mod export;
pub mod series;
pub mod store;
pub mod sync;

pub use config::AppConfig;
pub use domain::{Instrument, PriceRecord, PriceSeries};
pub use series::SeriesReader;
pub use store::{MemoryStore, ParquetStore, PriceStore, StoreError};
pub use sync::{SyncEngine, SyncError, SyncResult, SyncStatus};
