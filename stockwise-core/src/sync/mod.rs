//! Incremental sync: store cursor → provider chain → normalizer → upsert.
//!
//! Only dates after the newest stored record are written, so repeated runs
//! are cheap and idempotent. The cursor is read from the store on every
//! call and never cached.

pub mod batch;

pub use batch::{BatchReport, SilentProgress, SyncProgress};

use crate::config::{default_epoch_start, AppConfig};
use crate::data::{ColumnNormalizer, FetchOutcome, ProviderChain, SchemaError};
use crate::domain::PriceRecord;
use crate::store::{PriceStore, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Updated,
    NoNewData,
    UpToDate,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Updated => "updated",
            SyncStatus::NoNewData => "no_new_data",
            SyncStatus::UpToDate => "up_to_date",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of syncing one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub instrument_id: String,
    pub rows_written: usize,
    pub status: SyncStatus,
    /// Provider that served the history, when one did.
    pub provider: Option<String>,
}

impl SyncResult {
    fn new(instrument_id: &str, status: SyncStatus) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            rows_written: 0,
            status,
            provider: None,
        }
    }

    pub fn failed(instrument_id: &str) -> Self {
        Self::new(instrument_id, SyncStatus::Failed)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{instrument_id}: {source}")]
    Schema {
        instrument_id: String,
        #[source]
        source: SchemaError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Errors that make every further store call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_connection())
    }
}

pub struct SyncEngine<'a> {
    store: &'a dyn PriceStore,
    chain: &'a ProviderChain,
    normalizer: ColumnNormalizer,
    epoch_start: NaiveDate,
    parallel: bool,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a dyn PriceStore, chain: &'a ProviderChain) -> Self {
        Self {
            store,
            chain,
            normalizer: ColumnNormalizer::default(),
            epoch_start: default_epoch_start(),
            parallel: false,
        }
    }

    /// Engine with epoch, separator and parallelism taken from `config`.
    pub fn from_config(
        store: &'a dyn PriceStore,
        chain: &'a ProviderChain,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, chain)
            .with_normalizer(ColumnNormalizer::new(config.normalizer.header_separator.clone()))
            .with_epoch_start(config.sync.epoch_start)
            .with_parallel(config.sync.parallel)
    }

    pub fn with_normalizer(mut self, normalizer: ColumnNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_epoch_start(mut self, epoch_start: NaiveDate) -> Self {
        self.epoch_start = epoch_start;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn store(&self) -> &dyn PriceStore {
        self.store
    }

    /// Sync one instrument up to the local current date.
    pub fn sync(&self, instrument_id: &str) -> Result<SyncResult, SyncError> {
        self.sync_as_of(instrument_id, chrono::Local::now().date_naive())
    }

    /// Sync one instrument treating `today` as the last fetchable date.
    pub fn sync_as_of(&self, instrument_id: &str, today: NaiveDate) -> Result<SyncResult, SyncError> {
        let cursor = self.store.find_latest(instrument_id)?.map(|r| r.trade_date);
        let window_start = match cursor {
            None => Some(self.epoch_start),
            Some(last) => last.succ_opt(),
        };
        let Some(window_start) = window_start.filter(|start| *start <= today) else {
            info!(instrument_id, ?cursor, "already up to date");
            return Ok(SyncResult::new(instrument_id, SyncStatus::UpToDate));
        };

        let (provider, table) = match self.chain.fetch_full_history(instrument_id) {
            FetchOutcome::Fetched { provider, table } => (provider, table),
            FetchOutcome::Empty => {
                info!(instrument_id, "no provider returned data");
                return Ok(SyncResult::new(instrument_id, SyncStatus::NoNewData));
            }
        };

        let series = self
            .normalizer
            .normalize(instrument_id, &table)
            .map_err(|source| SyncError::Schema {
                instrument_id: instrument_id.to_string(),
                source,
            })?;

        let fresh = series.between(Some(window_start), Some(today));
        let (rows, void): (Vec<PriceRecord>, Vec<PriceRecord>) =
            fresh.into_records().into_iter().partition(|r| !r.is_void());
        if !void.is_empty() {
            debug!(
                instrument_id,
                skipped = void.len(),
                first = %void[0].trade_date,
                "skipping rows without a close price"
            );
        }

        let mut result = SyncResult::new(instrument_id, SyncStatus::NoNewData);
        result.provider = Some(provider);
        if rows.is_empty() {
            info!(instrument_id, %window_start, "no new rows");
            return Ok(result);
        }

        let written = self.store.upsert(&rows)?;
        info!(
            instrument_id,
            rows = written,
            provider = result.provider.as_deref().unwrap_or_default(),
            "synced"
        );
        result.rows_written = written;
        result.status = SyncStatus::Updated;
        Ok(result)
    }
}
