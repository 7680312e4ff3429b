//! Column normalizer: heterogeneous provider tables to a canonical series.
//!
//! Steps, in order:
//! 1. Flatten multi-level headers (`["Close", "NS"]` → `Close_NS`).
//! 2. Resolve the close column (first name containing "close", any case)
//!    and the date column.
//! 3. Parse dates; rows with unparsable dates are dropped.
//! 4. Coerce closes to f64, unwrapping nested cells to their first scalar.
//! 5. Sort ascending, dedupe by date (last occurrence wins).
//! 6. Forward-fill missing closes from the nearest prior valid value.

use super::canonicalize::Canonicalizer;
use super::raw::RawTable;
use crate::domain::{PriceRecord, PriceSeries};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Nested cells deeper than this are treated as missing.
pub const MAX_UNWRAP_DEPTH: usize = 8;

/// Exact (lowercase) names accepted as the date column, in priority order.
const DATE_COLUMN_NAMES: [&str; 5] = ["trade_date", "date", "datetime", "timestamp", "index"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no close price column found among [{columns}]")]
    NoCloseColumn { columns: String },

    #[error("no date column found among [{columns}]")]
    NoDateColumn { columns: String },

    #[error("canonical ordering failed: {0}")]
    Frame(String),
}

/// Maps raw provider/storage tables onto [`PriceSeries`].
#[derive(Debug, Clone)]
pub struct ColumnNormalizer {
    separator: String,
}

impl Default for ColumnNormalizer {
    fn default() -> Self {
        Self::new("_")
    }
}

impl ColumnNormalizer {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Flattened column names of `table`.
    pub fn flatten_columns(&self, table: &RawTable) -> Vec<String> {
        table
            .columns
            .iter()
            .map(|c| c.flatten(&self.separator))
            .collect()
    }

    /// Normalize `table` into a canonical series for `instrument_id`.
    pub fn normalize(
        &self,
        instrument_id: &str,
        table: &RawTable,
    ) -> Result<PriceSeries, SchemaError> {
        let names = self.flatten_columns(table);
        let close_idx = resolve_close_column(&names)?;
        let date_idx = resolve_date_column(&names, close_idx)?;

        let mut dates = Vec::with_capacity(table.rows.len());
        let mut records = Vec::with_capacity(table.rows.len());
        let mut dropped = 0usize;

        for row in &table.rows {
            let Some(date) = row.get(date_idx).and_then(parse_date) else {
                dropped += 1;
                continue;
            };
            let close = row
                .get(close_idx)
                .and_then(coerce_price)
                .unwrap_or(f64::NAN);

            let mut fields = Map::new();
            for (i, name) in names.iter().enumerate() {
                if i == date_idx || i == close_idx {
                    continue;
                }
                fields.insert(name.clone(), row.get(i).cloned().unwrap_or(Value::Null));
            }

            dates.push(date);
            records.push(PriceRecord {
                instrument_id: instrument_id.to_string(),
                trade_date: date,
                close_price: close,
                fields,
            });
        }

        if dropped > 0 {
            debug!(instrument_id, dropped, "dropped rows with unparsable dates");
        }

        let order =
            Canonicalizer::canonical_order(&dates).map_err(|e| SchemaError::Frame(e.to_string()))?;
        let mut slots: Vec<Option<PriceRecord>> = records.into_iter().map(Some).collect();
        let mut ordered: Vec<PriceRecord> = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();

        let mut closes: Vec<f64> = ordered.iter().map(|r| r.close_price).collect();
        forward_fill(&mut closes);
        for (record, close) in ordered.iter_mut().zip(closes) {
            record.close_price = close;
        }

        Ok(PriceSeries::from_records(instrument_id, ordered))
    }
}

/// Index of the first column whose name contains "close" (case-insensitive).
pub fn resolve_close_column(names: &[String]) -> Result<usize, SchemaError> {
    names
        .iter()
        .position(|n| n.to_lowercase().contains("close"))
        .ok_or_else(|| SchemaError::NoCloseColumn {
            columns: names.join(", "),
        })
}

/// Index of the date column, never the close column.
pub fn resolve_date_column(names: &[String], close_idx: usize) -> Result<usize, SchemaError> {
    let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let candidates = || lowered.iter().enumerate().filter(|(i, _)| *i != close_idx);

    DATE_COLUMN_NAMES
        .iter()
        .find_map(|wanted| candidates().find(|(_, n)| n.as_str() == *wanted).map(|(i, _)| i))
        .or_else(|| candidates().find(|(_, n)| n.contains("date")).map(|(i, _)| i))
        .ok_or_else(|| SchemaError::NoDateColumn {
            columns: names.join(", "),
        })
}

/// First scalar inside a possibly nested cell. `None` past [`MAX_UNWRAP_DEPTH`].
pub fn unwrap_scalar(value: &Value) -> Option<&Value> {
    fn go(value: &Value, depth: usize) -> Option<&Value> {
        if depth > MAX_UNWRAP_DEPTH {
            return None;
        }
        match value {
            Value::Object(map) => go(map.values().next()?, depth + 1),
            Value::Array(items) => go(items.first()?, depth + 1),
            scalar => Some(scalar),
        }
    }
    go(value, 0)
}

/// Coerce a cell to a finite price. Non-numeric or non-finite → `None`.
pub fn coerce_price(value: &Value) -> Option<f64> {
    let parsed = match unwrap_scalar(value)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Parse a date cell: ISO date, ISO datetime, RFC 3339, or Unix seconds.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match unwrap_scalar(value)? {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let secs = n.as_i64()?;
            DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Replace NaN with the nearest prior valid value. Leading NaNs stay.
pub fn forward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::raw::ColumnHeader;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn close_resolution_is_case_insensitive_substring() {
        assert_eq!(resolve_close_column(&names(&["Close_NS", "Open_NS"])).unwrap(), 0);
        assert_eq!(resolve_close_column(&names(&["date", "1. open", "4. close"])).unwrap(), 2);
        assert_eq!(resolve_close_column(&names(&["Date", "Adj CLOSE"])).unwrap(), 1);
    }

    #[test]
    fn missing_close_column_is_schema_error() {
        let err = resolve_close_column(&names(&["date", "open"])).unwrap_err();
        assert!(matches!(err, SchemaError::NoCloseColumn { .. }));
    }

    #[test]
    fn date_resolution_prefers_exact_names() {
        let cols = names(&["close_date", "close", "date"]);
        assert_eq!(resolve_date_column(&cols, 0).unwrap(), 2);
        let cols = names(&["Trade Date", "close"]);
        assert_eq!(resolve_date_column(&cols, 1).unwrap(), 0);
        assert!(resolve_date_column(&names(&["close", "open"]), 0).is_err());
    }

    #[test]
    fn unwrap_scalar_reads_first_nested_value() {
        let nested = json!({"value": {"INR": "2850.5", "USD": "34.2"}});
        assert_eq!(coerce_price(&nested), Some(2850.5));
        assert_eq!(coerce_price(&json!([[12.5]])), Some(12.5));
        assert_eq!(coerce_price(&json!({"value": "n/a"})), None);
        assert_eq!(coerce_price(&json!({})), None);
    }

    #[test]
    fn unwrap_depth_overflow_is_missing() {
        let mut deep = json!(1.0);
        for _ in 0..(MAX_UNWRAP_DEPTH + 2) {
            deep = json!([deep]);
        }
        assert_eq!(coerce_price(&deep), None);

        let mut shallow = json!(1.0);
        for _ in 0..MAX_UNWRAP_DEPTH {
            shallow = json!([shallow]);
        }
        assert_eq!(coerce_price(&shallow), Some(1.0));
    }

    #[test]
    fn parse_date_accepts_common_shapes() {
        assert_eq!(parse_date(&json!("2024-01-02")), Some(d("2024-01-02")));
        assert_eq!(parse_date(&json!("2024-01-02 00:00:00")), Some(d("2024-01-02")));
        assert_eq!(parse_date(&json!("2024-01-02T09:15:00+05:30")), Some(d("2024-01-02")));
        assert_eq!(parse_date(&json!(1_704_153_600)), Some(d("2024-01-02")));
        assert_eq!(parse_date(&json!("yesterday")), None);
        assert_eq!(parse_date(&json!(null)), None);
    }

    #[test]
    fn forward_fill_leaves_leading_gap() {
        let mut v = [f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0];
        forward_fill(&mut v);
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, 1.0, 1.0, 4.0]);
    }

    #[test]
    fn normalize_full_pipeline() {
        let mut table = RawTable::new(vec![
            ColumnHeader::multi(["Date", ""]),
            ColumnHeader::multi(["Close", "NS"]),
            ColumnHeader::multi(["Open", "NS"]),
        ]);
        table.push_row(vec![json!("2024-01-04"), json!("13"), json!(12.0)]);
        table.push_row(vec![json!("2024-01-02"), json!("bad"), json!(9.0)]);
        table.push_row(vec![json!("not a date"), json!(99.0), json!(99.0)]);
        table.push_row(vec![json!("2024-01-03"), json!(10.0), json!(10.0)]);
        table.push_row(vec![json!("2024-01-05"), json!(null), json!(13.0)]);
        table.push_row(vec![json!("2024-01-04"), json!(14.0), json!(13.5)]);

        let series = ColumnNormalizer::default()
            .normalize("RELIANCE.NS", &table)
            .unwrap();

        assert_eq!(
            series.dates(),
            vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04"), d("2024-01-05")]
        );
        let closes = series.closes();
        assert!(closes[0].is_nan());
        assert_eq!(&closes[1..], &[10.0, 14.0, 14.0]);

        let first_fields = &series.records()[2].fields;
        assert_eq!(first_fields.get("Open_NS"), Some(&json!(13.5)));
        assert!(!first_fields.contains_key("Close_NS"));
        assert!(!first_fields.contains_key("Date"));
    }

    #[test]
    fn normalize_without_close_fails() {
        let mut table = RawTable::with_columns(&["date", "open"]);
        table.push_row(vec![json!("2024-01-02"), json!(1.0)]);
        let err = ColumnNormalizer::default().normalize("X", &table).unwrap_err();
        assert!(matches!(err, SchemaError::NoCloseColumn { .. }));
    }

    #[test]
    fn normalize_empty_table_is_empty_series() {
        let table = RawTable::with_columns(&["date", "close"]);
        let series = ColumnNormalizer::default().normalize("X", &table).unwrap();
        assert!(series.is_empty());
    }
}
