//! Parquet store with Hive-style partitioning.
//!
//! Layout:
//! - `{root}/instruments.json` instrument registry
//! - `{root}/instrument={ID}/{year}.parquet` columns `trade_date` (Date),
//!   `close_price` (f64), `fields` (JSON object as string)
//! - `{root}/instrument={ID}/meta.json` sidecar (date range, row count)
//!
//! Every file is written to `.tmp` and renamed into place. Partitions that
//! fail to load are renamed to `{file}.quarantined` and skipped.

use super::{check_writable, DateRange, PriceStore, StoreError};
use crate::data::canonicalize::{epoch_days, from_epoch_days};
use crate::domain::{Instrument, PriceRecord};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Sidecar describing what is stored for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub instrument_id: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub row_count: usize,
    pub updated_at: NaiveDateTime,
}

pub struct ParquetStore {
    root: PathBuf,
    registry_lock: Mutex<()>,
}

impl ParquetStore {
    /// Open a store rooted at `root`.
    ///
    /// A missing root is created when `create_if_missing` is set; otherwise,
    /// or when creation fails, the result is `StoreError::Connection`.
    pub fn open(root: impl Into<PathBuf>, create_if_missing: bool) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.exists() {
            if !create_if_missing {
                return Err(StoreError::Connection {
                    root,
                    reason: "directory does not exist".into(),
                });
            }
            if let Err(e) = fs::create_dir_all(&root) {
                return Err(StoreError::Connection {
                    root,
                    reason: format!("create directory: {e}"),
                });
            }
        }
        let store = Self {
            root,
            registry_lock: Mutex::new(()),
        };
        store.ensure_reachable()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Connection {
                root: self.root.clone(),
                reason: "not a directory".into(),
            })
        }
    }

    /// `{root}/instrument={ID}/`
    fn instrument_dir(&self, instrument_id: &str) -> Result<PathBuf, String> {
        let id = instrument_id.trim();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(format!("instrument id '{instrument_id}' cannot be stored"));
        }
        Ok(self.root.join(format!("instrument={id}")))
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("instruments.json")
    }

    /// Stored partition years for an instrument, ascending.
    fn partition_years(&self, dir: &Path) -> Result<Vec<i32>, StoreError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir)
            .map_err(|e| StoreError::Read(format!("read dir {}: {e}", dir.display())))?;

        let mut years = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Read(format!("dir entry: {e}")))?;
            let path = entry.path();
            // Skip meta.json, .tmp and .quarantined files
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    /// Load one partition; a corrupt file is quarantined and reads as empty.
    fn load_or_quarantine(
        &self,
        instrument_id: &str,
        path: &Path,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        match read_partition(instrument_id, path) {
            Ok(records) => Ok(records),
            Err(StoreError::Corrupt { path, reason }) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(
                    path = %path.display(),
                    %reason,
                    "quarantining corrupt partition"
                );
                if let Err(e) = fs::rename(&path, &quarantine) {
                    warn!(path = %path.display(), error = %e, "quarantine rename failed");
                }
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Stored metadata for an instrument, if any.
    pub fn meta(&self, instrument_id: &str) -> Option<InstrumentMeta> {
        let dir = self.instrument_dir(instrument_id).ok()?;
        let content = fs::read_to_string(dir.join("meta.json")).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn refresh_meta(&self, instrument_id: &str, dir: &Path) -> Result<(), StoreError> {
        let mut first: Option<NaiveDate> = None;
        let mut last: Option<NaiveDate> = None;
        let mut row_count = 0;
        for year in self.partition_years(dir)? {
            let records = self.load_or_quarantine(instrument_id, &year_path(dir, year))?;
            row_count += records.len();
            for r in &records {
                first = Some(first.map_or(r.trade_date, |f| f.min(r.trade_date)));
                last = Some(last.map_or(r.trade_date, |l| l.max(r.trade_date)));
            }
        }
        let (Some(first_date), Some(last_date)) = (first, last) else {
            return Ok(());
        };

        let meta = InstrumentMeta {
            instrument_id: instrument_id.to_string(),
            first_date,
            last_date,
            row_count,
            updated_at: chrono::Utc::now().naive_utc(),
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Write(format!("meta serialization: {e}")))?;
        write_atomic(&dir.join("meta.json"), &json)
    }

    fn read_registry(&self) -> Result<BTreeMap<String, Instrument>, StoreError> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| StoreError::Read(format!("read {}: {e}", path.display())))?;
        let list: Vec<Instrument> =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok(list
            .into_iter()
            .map(|i| (i.instrument_id.clone(), i))
            .collect())
    }
}

fn year_path(dir: &Path, year: i32) -> PathBuf {
    dir.join(format!("{year}.parquet"))
}

/// Write `bytes` to `path` through a sibling temp file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes)
        .map_err(|e| StoreError::Write(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Write(format!("atomic rename to {}: {e}", path.display()))
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn records_to_dataframe(records: &[&PriceRecord]) -> Result<DataFrame, StoreError> {
    let dates: Vec<i32> = records.iter().map(|r| epoch_days(r.trade_date)).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close_price).collect();
    let fields = records
        .iter()
        .map(|r| serde_json::to_string(&r.fields))
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| StoreError::Write(format!("fields serialization: {e}")))?;

    DataFrame::new(vec![
        Column::new("trade_date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Write(format!("date cast: {e}")))?,
        Column::new("close_price".into(), closes),
        Column::new("fields".into(), fields),
    ])
    .map_err(|e| StoreError::Write(format!("dataframe creation: {e}")))
}

fn write_partition(path: &Path, records: &[&PriceRecord]) -> Result<(), StoreError> {
    let mut df = records_to_dataframe(records)?;
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp)
        .map_err(|e| StoreError::Write(format!("create {}: {e}", tmp.display())))?;
    ParquetWriter::new(file).finish(&mut df).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Write(format!("write parquet: {e}"))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Write(format!("atomic rename to {}: {e}", path.display()))
    })
}

fn read_partition(instrument_id: &str, path: &Path) -> Result<Vec<PriceRecord>, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file = fs::File::open(path)
        .map_err(|e| StoreError::Read(format!("open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| corrupt(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(corrupt("empty partition".into()));
    }

    let dates = df
        .column("trade_date")
        .and_then(|c| c.date())
        .map_err(|e| corrupt(format!("trade_date column: {e}")))?;
    let closes = df
        .column("close_price")
        .and_then(|c| c.f64())
        .map_err(|e| corrupt(format!("close_price column: {e}")))?;
    let fields = df
        .column("fields")
        .and_then(|c| c.str())
        .map_err(|e| corrupt(format!("fields column: {e}")))?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let trade_date = dates
            .get(i)
            .and_then(from_epoch_days)
            .ok_or_else(|| corrupt(format!("invalid trade_date at row {i}")))?;
        let fields = match fields.get(i) {
            Some(s) => serde_json::from_str::<Map<String, Value>>(s)
                .map_err(|e| corrupt(format!("fields at row {i}: {e}")))?,
            None => Map::new(),
        };
        records.push(PriceRecord {
            instrument_id: instrument_id.to_string(),
            trade_date,
            close_price: closes.get(i).unwrap_or(f64::NAN),
            fields,
        });
    }
    Ok(records)
}

impl PriceStore for ParquetStore {
    fn find(&self, instrument_id: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError> {
        self.ensure_reachable()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let dir = self.instrument_dir(instrument_id).map_err(StoreError::Read)?;

        let mut out = Vec::new();
        for year in self.partition_years(&dir)? {
            if range.start.is_some_and(|s| year < s.year()) || range.end.is_some_and(|e| year > e.year()) {
                continue;
            }
            let records = self.load_or_quarantine(instrument_id, &year_path(&dir, year))?;
            out.extend(records.into_iter().filter(|r| range.contains(r.trade_date)));
        }
        out.sort_by_key(|r| r.trade_date);
        Ok(out)
    }

    fn find_latest(&self, instrument_id: &str) -> Result<Option<PriceRecord>, StoreError> {
        self.ensure_reachable()?;
        let dir = self.instrument_dir(instrument_id).map_err(StoreError::Read)?;
        for year in self.partition_years(&dir)?.into_iter().rev() {
            let records = self.load_or_quarantine(instrument_id, &year_path(&dir, year))?;
            if let Some(latest) = records.into_iter().max_by_key(|r| r.trade_date) {
                return Ok(Some(latest));
            }
        }
        Ok(None)
    }

    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        self.ensure_reachable()?;
        check_writable(records)?;

        let mut grouped: BTreeMap<&str, BTreeMap<i32, Vec<&PriceRecord>>> = BTreeMap::new();
        for r in records {
            grouped
                .entry(r.instrument_id.as_str())
                .or_default()
                .entry(r.trade_date.year())
                .or_default()
                .push(r);
        }

        let mut written = BTreeSet::new();
        for (instrument_id, by_year) in grouped {
            let dir = self.instrument_dir(instrument_id).map_err(StoreError::Write)?;
            fs::create_dir_all(&dir)
                .map_err(|e| StoreError::Write(format!("create {}: {e}", dir.display())))?;

            for (year, incoming) in by_year {
                let path = year_path(&dir, year);
                let existing = if path.exists() {
                    self.load_or_quarantine(instrument_id, &path)?
                } else {
                    Vec::new()
                };

                let mut merged: BTreeMap<NaiveDate, &PriceRecord> = BTreeMap::new();
                for r in &existing {
                    merged.insert(r.trade_date, r);
                }
                for r in incoming {
                    merged.insert(r.trade_date, r);
                    written.insert((instrument_id, r.trade_date));
                }

                let rows: Vec<&PriceRecord> = merged.into_values().collect();
                write_partition(&path, &rows)?;
                debug!(instrument_id, year, rows = rows.len(), "partition written");
            }
            self.refresh_meta(instrument_id, &dir)?;
        }
        Ok(written.len())
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, StoreError> {
        self.ensure_reachable()?;
        Ok(self.read_registry()?.into_values().collect())
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError> {
        self.ensure_reachable()?;
        Ok(self.read_registry()?.remove(instrument_id))
    }

    fn put_instrument(&self, instrument: Instrument) -> Result<(), StoreError> {
        self.ensure_reachable()?;
        self.instrument_dir(&instrument.instrument_id)
            .map_err(StoreError::Write)?;

        let _guard = self.registry_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut registry = self.read_registry()?;
        registry.insert(instrument.instrument_id.clone(), instrument);
        let list: Vec<&Instrument> = registry.values().collect();
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| StoreError::Write(format!("registry serialization: {e}")))?;
        write_atomic(&self.registry_path(), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store() -> (tempfile::TempDir, ParquetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::open(dir.path().join("prices"), true).unwrap();
        (dir, store)
    }

    fn sample() -> Vec<PriceRecord> {
        vec![
            PriceRecord::new("RELIANCE.NS", d("2023-12-29"), 2584.95).with_field("volume", json!(4_000_000)),
            PriceRecord::new("RELIANCE.NS", d("2024-01-01"), 2590.10),
            PriceRecord::new("RELIANCE.NS", d("2024-01-02"), 2601.50).with_field("open", json!("2580.00")),
        ]
    }

    #[test]
    fn write_and_load_roundtrip() {
        let (_dir, store) = store();
        assert_eq!(store.upsert(&sample()).unwrap(), 3);

        let loaded = store.find("RELIANCE.NS", DateRange::all()).unwrap();
        assert_eq!(loaded, sample());
        assert!(store.root().join("instrument=RELIANCE.NS/2023.parquet").exists());
        assert!(store.root().join("instrument=RELIANCE.NS/2024.parquet").exists());
    }

    #[test]
    fn upsert_merges_within_partition() {
        let (_dir, store) = store();
        store.upsert(&sample()).unwrap();
        let revised = PriceRecord::new("RELIANCE.NS", d("2024-01-02"), 2605.0);
        assert_eq!(store.upsert(&[revised.clone()]).unwrap(), 1);

        let loaded = store.find("RELIANCE.NS", DateRange::since(d("2024-01-01"))).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], revised);

        let meta = store.meta("RELIANCE.NS").unwrap();
        assert_eq!(meta.row_count, 3);
        assert_eq!(meta.first_date, d("2023-12-29"));
        assert_eq!(meta.last_date, d("2024-01-02"));
    }

    #[test]
    fn latest_spans_partitions() {
        let (_dir, store) = store();
        assert!(store.find_latest("RELIANCE.NS").unwrap().is_none());
        store.upsert(&sample()).unwrap();
        let latest = store.find_latest("RELIANCE.NS").unwrap().unwrap();
        assert_eq!(latest.trade_date, d("2024-01-02"));
    }

    #[test]
    fn corrupt_partition_is_quarantined() {
        let (_dir, store) = store();
        store.upsert(&sample()).unwrap();
        let path = store.root().join("instrument=RELIANCE.NS/2024.parquet");
        fs::write(&path, b"not parquet").unwrap();

        let loaded = store.find("RELIANCE.NS", DateRange::all()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!path.exists());
        assert!(store
            .root()
            .join("instrument=RELIANCE.NS/2024.parquet.quarantined")
            .exists());
    }

    #[test]
    fn registry_roundtrip() {
        let (_dir, store) = store();
        store.put_instrument(Instrument::new("ITC.NS", "ITC")).unwrap();
        store.put_instrument(Instrument::new("INFY.NS", "Infosys")).unwrap();
        store.put_instrument(Instrument::new("ITC.NS", "ITC Limited")).unwrap();

        let all = store.list_instruments().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].instrument_id, "INFY.NS");
        assert_eq!(store.get_instrument("ITC.NS").unwrap().unwrap().display_name, "ITC Limited");
        assert!(store.get_instrument("WIPRO.NS").unwrap().is_none());
    }

    #[test]
    fn missing_root_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ParquetStore::open(dir.path().join("absent"), false).err().unwrap();
        assert!(err.is_connection());

        let store = ParquetStore::open(dir.path().join("gone"), true).unwrap();
        fs::remove_dir_all(store.root()).unwrap();
        let err = store.find_latest("X").unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn rejects_path_like_ids() {
        let (_dir, store) = store();
        let err = store.upsert(&[PriceRecord::new("../x", d("2024-01-02"), 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
    }
}
