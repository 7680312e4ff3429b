//! Day-over-day jumps larger than a threshold.

use crate::domain::PriceSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbruptChange {
    pub trade_date: NaiveDate,
    pub close_price: f64,
    pub pct_change: f64,
}

/// Fractional change from the previous row.
///
/// NaN for the first row and wherever the previous close is zero or either
/// close is missing.
pub fn pct_changes(closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    for pair in closes.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if prev == 0.0 || prev.is_nan() || cur.is_nan() {
            out.push(f64::NAN);
        } else {
            out.push((cur - prev) / prev);
        }
    }
    out
}

/// Rows whose `|pct_change|` is strictly greater than `threshold`.
pub fn abrupt_changes(series: &PriceSeries, threshold: f64) -> Vec<AbruptChange> {
    let closes = series.closes();
    pct_changes(&closes)
        .into_iter()
        .zip(series.records())
        .filter(|(pct, _)| pct.abs() > threshold)
        .map(|(pct_change, r)| AbruptChange {
            trade_date: r.trade_date,
            close_price: r.close_price,
            pct_change,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[f64]) -> PriceSeries {
        let points: Vec<(NaiveDate, f64)> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| (NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32).unwrap(), c))
            .collect();
        PriceSeries::from_closes("X", &points)
    }

    #[test]
    fn boundary_is_strict() {
        let changes = abrupt_changes(&series(&[10.0, 10.5, 9.0, 13.0]), 0.05);
        let dates: Vec<u32> = changes.iter().map(|c| chrono::Datelike::day(&c.trade_date)).collect();
        assert_eq!(dates, vec![3, 4]);
        assert!((changes[0].pct_change - (9.0 - 10.5) / 10.5).abs() < 1e-12);
        assert_eq!(changes[1].close_price, 13.0);
    }

    #[test]
    fn zero_and_missing_previous_close_are_never_flagged() {
        let changes = abrupt_changes(&series(&[0.0, 5.0, f64::NAN, 50.0]), 0.05);
        assert!(changes.is_empty());
    }

    #[test]
    fn short_series() {
        assert!(abrupt_changes(&series(&[]), 0.0).is_empty());
        assert!(abrupt_changes(&series(&[1.0]), 0.0).is_empty());
        assert!(pct_changes(&[1.0])[0].is_nan());
    }
}
