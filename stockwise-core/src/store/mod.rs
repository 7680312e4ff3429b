//! Persistent price history.
//!
//! The store owns every persisted record. `(instrument_id, trade_date)` is
//! the key; an upsert of an existing key replaces the stored record.

pub mod memory;
pub mod parquet;

pub use memory::MemoryStore;
pub use parquet::{InstrumentMeta, ParquetStore};

use crate::domain::{Instrument, PriceRecord};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store itself cannot be reached. Fatal to a whole batch.
    #[error("store unreachable at {root}: {reason}")]
    Connection { root: PathBuf, reason: String },

    #[error("store read failed: {0}")]
    Read(String),

    #[error("store write failed: {0}")]
    Write(String),

    #[error("corrupt store file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection { .. })
    }
}

/// Inclusive date bounds; `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn since(start: NaiveDate) -> Self {
        Self::new(Some(start), None)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    /// True when `start > end`, i.e. nothing can match.
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }
}

/// Storage backend for price records and instrument reference data.
pub trait PriceStore: Send + Sync {
    /// Records of one instrument within `range`, ascending by date.
    fn find(&self, instrument_id: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError>;

    /// Most recent record of one instrument.
    fn find_latest(&self, instrument_id: &str) -> Result<Option<PriceRecord>, StoreError>;

    /// Insert or replace by `(instrument_id, trade_date)`. Returns the number
    /// of distinct keys written.
    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, StoreError>;

    fn list_instruments(&self) -> Result<Vec<Instrument>, StoreError>;

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError>;

    /// Insert or replace an instrument by id.
    fn put_instrument(&self, instrument: Instrument) -> Result<(), StoreError>;
}

/// Every record must carry a close price before it reaches a store.
pub(crate) fn check_writable(records: &[PriceRecord]) -> Result<(), StoreError> {
    match records.iter().find(|r| r.is_void()) {
        Some(r) => Err(StoreError::Write(format!(
            "{} {}: close_price is missing",
            r.instrument_id, r.trade_date
        ))),
        None => Ok(()),
    }
}
