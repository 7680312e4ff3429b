//! In-memory store for tests and dry runs.

use super::{check_writable, DateRange, PriceStore, StoreError};
use crate::domain::{Instrument, PriceRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    prices: BTreeMap<String, BTreeMap<NaiveDate, PriceRecord>>,
    instruments: BTreeMap<String, Instrument>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-registered with `instruments`.
    pub fn with_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.write();
            for inst in instruments {
                inner.instruments.insert(inst.instrument_id.clone(), inst);
            }
        }
        store
    }

    /// Total records across every instrument.
    pub fn record_count(&self) -> usize {
        self.read().prices.values().map(BTreeMap::len).sum()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PriceStore for MemoryStore {
    fn find(&self, instrument_id: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read();
        Ok(inner
            .prices
            .get(instrument_id)
            .map(|days| days.values().filter(|r| range.contains(r.trade_date)).cloned().collect())
            .unwrap_or_default())
    }

    fn find_latest(&self, instrument_id: &str) -> Result<Option<PriceRecord>, StoreError> {
        let inner = self.read();
        Ok(inner
            .prices
            .get(instrument_id)
            .and_then(|days| days.values().next_back().cloned()))
    }

    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        check_writable(records)?;
        let mut inner = self.write();
        let mut keys = std::collections::BTreeSet::new();
        for record in records {
            keys.insert((record.instrument_id.as_str(), record.trade_date));
            inner
                .prices
                .entry(record.instrument_id.clone())
                .or_default()
                .insert(record.trade_date, record.clone());
        }
        Ok(keys.len())
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, StoreError> {
        Ok(self.read().instruments.values().cloned().collect())
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError> {
        Ok(self.read().instruments.get(instrument_id).cloned())
    }

    fn put_instrument(&self, instrument: Instrument) -> Result<(), StoreError> {
        self.write()
            .instruments
            .insert(instrument.instrument_id.clone(), instrument);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn upsert_replaces_by_key() {
        let store = MemoryStore::new();
        let first = PriceRecord::new("ITC.NS", d("2024-01-02"), 450.0);
        let second = PriceRecord::new("ITC.NS", d("2024-01-02"), 452.5).with_field("volume", json!(10));

        assert_eq!(store.upsert(&[first]).unwrap(), 1);
        assert_eq!(store.upsert(&[second.clone()]).unwrap(), 1);

        let found = store.find("ITC.NS", DateRange::all()).unwrap();
        assert_eq!(found, vec![second]);
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn find_respects_range_and_latest() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                PriceRecord::new("A", d("2024-01-03"), 3.0),
                PriceRecord::new("A", d("2024-01-01"), 1.0),
                PriceRecord::new("A", d("2024-01-02"), 2.0),
                PriceRecord::new("B", d("2024-01-05"), 9.0),
            ])
            .unwrap();

        let mid = store
            .find("A", DateRange::new(Some(d("2024-01-02")), None))
            .unwrap();
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].trade_date, d("2024-01-02"));

        let latest = store.find_latest("A").unwrap().unwrap();
        assert_eq!(latest.trade_date, d("2024-01-03"));
        assert!(store.find_latest("C").unwrap().is_none());
        assert!(store
            .find("A", DateRange::new(Some(d("2024-01-03")), Some(d("2024-01-01"))))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn instruments_are_keyed_by_id() {
        let store = MemoryStore::new();
        store.put_instrument(Instrument::new("TCS.NS", "TCS")).unwrap();
        store
            .put_instrument(Instrument::new("TCS.NS", "Tata Consultancy Services"))
            .unwrap();
        assert_eq!(store.list_instruments().unwrap().len(), 1);
        assert_eq!(
            store.get_instrument("TCS.NS").unwrap().unwrap().display_name,
            "Tata Consultancy Services"
        );
    }
}
