//! Multi-instrument time alignment.
//!
//! Inner join on `trade_date`: only dates present in every non-empty
//! series survive. Series without rows are left out entirely.

use crate::domain::PriceSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Close prices of several instruments on a shared date axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedSeries {
    /// Common dates, ascending.
    pub dates: Vec<NaiveDate>,
    /// Display name (or id) per column.
    pub labels: Vec<String>,
    /// One close column per label, each `dates.len()` long.
    pub columns: Vec<Vec<f64>>,
}

impl AlignedSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn width(&self) -> usize {
        self.labels.len()
    }

    /// First column carrying `label`.
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| self.columns.get(i))
            .map(Vec::as_slice)
    }
}

pub fn align(series: &[PriceSeries]) -> AlignedSeries {
    let present: Vec<&PriceSeries> = series.iter().filter(|s| !s.is_empty()).collect();
    if present.is_empty() {
        return AlignedSeries::default();
    }

    let mut common: BTreeSet<NaiveDate> = present[0].dates().into_iter().collect();
    for s in &present[1..] {
        let dates: BTreeSet<NaiveDate> = s.dates().into_iter().collect();
        common = common.intersection(&dates).copied().collect();
    }
    let dates: Vec<NaiveDate> = common.into_iter().collect();

    let columns = present
        .iter()
        .map(|s| {
            let by_date: HashMap<NaiveDate, f64> = s
                .records()
                .iter()
                .map(|r| (r.trade_date, r.close_price))
                .collect();
            dates
                .iter()
                .map(|d| by_date.get(d).copied().unwrap_or(f64::NAN))
                .collect()
        })
        .collect();

    AlignedSeries {
        dates,
        labels: present.iter().map(|s| s.label().to_string()).collect(),
        columns,
    }
}
