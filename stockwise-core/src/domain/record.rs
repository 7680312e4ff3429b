//! PriceRecord and PriceSeries: the canonical price history units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One instrument, one trading date.
///
/// `(instrument_id, trade_date)` is the storage key. A missing close is NaN;
/// `fields` carries whatever else the provider returned, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub instrument_id: String,
    pub trade_date: NaiveDate,
    pub close_price: f64,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl PriceRecord {
    pub fn new(instrument_id: impl Into<String>, trade_date: NaiveDate, close_price: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            trade_date,
            close_price,
            fields: Map::new(),
        }
    }

    /// Attach a passthrough field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// True when the close price is missing.
    pub fn is_void(&self) -> bool {
        self.close_price.is_nan()
    }
}

/// Date-ordered price history for a single instrument.
///
/// Dates are strictly increasing; construction from arbitrary records sorts
/// and keeps the last record seen for each date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    instrument_id: String,
    display_name: Option<String>,
    records: Vec<PriceRecord>,
}

impl PriceSeries {
    /// An empty series for `instrument_id`.
    pub fn empty(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            display_name: None,
            records: Vec::new(),
        }
    }

    /// Build a series from records in any order. Later duplicates win.
    pub fn from_records(instrument_id: impl Into<String>, records: Vec<PriceRecord>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, PriceRecord> = BTreeMap::new();
        for record in records {
            by_date.insert(record.trade_date, record);
        }
        Self {
            instrument_id: instrument_id.into(),
            display_name: None,
            records: by_date.into_values().collect(),
        }
    }

    /// Build a series from `(date, close)` pairs.
    pub fn from_closes(instrument_id: &str, points: &[(NaiveDate, f64)]) -> Self {
        let records = points
            .iter()
            .map(|&(date, close)| PriceRecord::new(instrument_id, date, close))
            .collect();
        Self::from_records(instrument_id, records)
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Display name, falling back to the instrument id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.instrument_id)
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.trade_date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.close_price).collect()
    }

    pub fn first(&self) -> Option<&PriceRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&PriceRecord> {
        self.records.last()
    }

    /// Records with `start <= trade_date <= end`; `None` bounds are open.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let records = self
            .records
            .iter()
            .filter(|r| start.map_or(true, |s| r.trade_date >= s))
            .filter(|r| end.map_or(true, |e| r.trade_date <= e))
            .cloned()
            .collect();
        Self {
            instrument_id: self.instrument_id.clone(),
            display_name: self.display_name.clone(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn from_records_sorts_and_keeps_last_duplicate() {
        let series = PriceSeries::from_records(
            "INFY.NS",
            vec![
                PriceRecord::new("INFY.NS", d("2024-01-03"), 11.0),
                PriceRecord::new("INFY.NS", d("2024-01-02"), 10.0),
                PriceRecord::new("INFY.NS", d("2024-01-03"), 12.0),
            ],
        );

        assert_eq!(series.dates(), vec![d("2024-01-02"), d("2024-01-03")]);
        assert_eq!(series.closes(), vec![10.0, 12.0]);
    }

    #[test]
    fn label_falls_back_to_id() {
        let series = PriceSeries::empty("TCS.NS");
        assert_eq!(series.label(), "TCS.NS");

        let named = series.with_display_name(Some("Tata Consultancy Services".into()));
        assert_eq!(named.label(), "Tata Consultancy Services");
    }

    #[test]
    fn between_is_inclusive() {
        let series = PriceSeries::from_closes(
            "X",
            &[
                (d("2024-01-01"), 1.0),
                (d("2024-01-02"), 2.0),
                (d("2024-01-03"), 3.0),
            ],
        );

        let sub = series.between(Some(d("2024-01-02")), Some(d("2024-01-03")));
        assert_eq!(sub.closes(), vec![2.0, 3.0]);

        let open_start = series.between(None, Some(d("2024-01-01")));
        assert_eq!(open_start.len(), 1);

        let inverted = series.between(Some(d("2024-01-03")), Some(d("2024-01-01")));
        assert!(inverted.is_empty());
    }

    #[test]
    fn record_serialization_keeps_fields() {
        let record = PriceRecord::new("SBIN.NS", d("2024-02-01"), 620.5)
            .with_field("volume", serde_json::json!(1200));
        let json = serde_json::to_string(&record).unwrap();
        let back: PriceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
