//! CSV export of series and analytics tables.
//!
//! Every table has a header row and one row per date (or per label for the
//! correlation matrix). Missing numbers are written as empty cells.

use crate::analytics::{AbruptChange, AlignedSeries, CorrelationMatrix, OverlayRow, RiskPoint};
use crate::domain::PriceSeries;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush CSV writer: {0}")]
    Flush(String),

    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn price(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn derived(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:.6}")
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(data)?)
}

/// `trade_date,close_price` then passthrough fields in first-seen order.
pub fn series_csv(series: &PriceSeries) -> Result<String, ExportError> {
    let mut field_names: Vec<&str> = Vec::new();
    for r in series.records() {
        for key in r.fields.keys() {
            if !field_names.contains(&key.as_str()) {
                field_names.push(key);
            }
        }
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["trade_date", "close_price"];
    header.extend(&field_names);
    wtr.write_record(&header)?;

    for r in series.records() {
        let mut row = vec![r.trade_date.to_string(), price(r.close_price)];
        row.extend(field_names.iter().map(|f| cell(r.fields.get(*f))));
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

pub fn overlay_csv(rows: &[OverlayRow]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["trade_date", "close_price", "sma", "ema"])?;
    for r in rows {
        wtr.write_record([
            r.trade_date.to_string(),
            price(r.close_price),
            derived(r.sma),
            derived(r.ema),
        ])?;
    }
    finish(wtr)
}

pub fn abrupt_csv(changes: &[AbruptChange]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["trade_date", "close_price", "pct_change"])?;
    for c in changes {
        wtr.write_record([c.trade_date.to_string(), price(c.close_price), derived(c.pct_change)])?;
    }
    finish(wtr)
}

pub fn risk_csv(points: &[RiskPoint]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["trade_date", "close_price", "volatility", "risk"])?;
    for p in points {
        wtr.write_record([
            p.trade_date.to_string(),
            price(p.close_price),
            derived(p.volatility),
            derived(p.risk),
        ])?;
    }
    finish(wtr)
}

/// `trade_date` then one close column per label.
pub fn aligned_csv(aligned: &AlignedSeries) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["trade_date".to_string()];
    header.extend(aligned.labels.iter().cloned());
    wtr.write_record(&header)?;

    for (i, date) in aligned.dates.iter().enumerate() {
        let mut row = vec![date.to_string()];
        row.extend(aligned.columns.iter().map(|col| price(col[i])));
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Blank corner cell, labels across and down.
pub fn correlation_csv(matrix: &CorrelationMatrix) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec![String::new()];
    header.extend(matrix.labels.iter().cloned());
    wtr.write_record(&header)?;

    for (label, values) in matrix.labels.iter().zip(&matrix.values) {
        let mut row = vec![label.clone()];
        row.extend(values.iter().map(|v| derived(*v)));
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Write rendered CSV to `path`.
pub fn save(path: &Path, csv: &str) -> Result<(), ExportError> {
    std::fs::write(path, csv).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics;
    use crate::domain::PriceRecord;
    use chrono::NaiveDate;
    use serde_json::json;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn series_has_passthrough_columns() {
        let series = PriceSeries::from_records(
            "TCS.NS",
            vec![
                PriceRecord::new("TCS.NS", d(2), 3762.4).with_field("volume", json!(2011034)),
                PriceRecord::new("TCS.NS", d(3), 3781.25)
                    .with_field("volume", json!(1822045))
                    .with_field("open", json!("3760.00")),
            ],
        );
        let csv = series_csv(&series).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "trade_date,close_price,volume,open");
        assert_eq!(lines[1], "2024-01-02,3762.4,2011034,");
        assert_eq!(lines[2], "2024-01-03,3781.25,1822045,3760.00");
    }

    #[test]
    fn missing_numbers_are_blank() {
        let series = PriceSeries::from_closes("X", &[(d(2), 10.0), (d(3), 11.0)]);
        let csv = abrupt_csv(&analytics::abrupt_changes(&series, 0.05)).unwrap();
        assert_eq!(csv, "trade_date,close_price,pct_change\n2024-01-03,11,0.100000\n");

        let m = analytics::correlate(&[series.clone(), PriceSeries::from_closes("F", &[(d(2), 1.0), (d(3), 1.0)])]);
        let csv = correlation_csv(&m).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], ",X,F");
        assert_eq!(lines[1], "X,1.000000,");
    }

    #[test]
    fn aligned_has_one_column_per_label() {
        let a = PriceSeries::from_closes("A", &[(d(2), 1.0), (d(3), 2.0)]);
        let b = PriceSeries::from_closes("B", &[(d(3), 5.5)]);
        let csv = aligned_csv(&analytics::align(&[a, b])).unwrap();
        assert_eq!(csv, "trade_date,A,B\n2024-01-03,2,5.5\n");
    }
}
