use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Polars `Date` physical value (days since Unix epoch) for a calendar date.
pub(crate) fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Inverse of [`epoch_days`].
pub(crate) fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Canonicalizer for dated rows
pub struct Canonicalizer;

impl Canonicalizer {
    /// Canonicalize: sort ascending by `trade_date`, keep the last row per date
    pub fn canonicalize(df: LazyFrame) -> LazyFrame {
        df.sort(
            ["trade_date"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(Some(vec!["trade_date".into()]), UniqueKeepStrategy::Last)
        .sort(
            ["trade_date"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
    }

    /// Row positions of `dates` in canonical order.
    ///
    /// The returned indices point into `dates`; each date appears once,
    /// represented by its last occurrence.
    pub fn canonical_order(dates: &[NaiveDate]) -> PolarsResult<Vec<usize>> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let days: Vec<i32> = dates.iter().map(|d| epoch_days(*d)).collect();
        let rows: Vec<u32> = (0..dates.len() as u32).collect();
        let df = DataFrame::new(vec![
            Column::new("trade_date".into(), days).cast(&DataType::Date)?,
            Column::new("row".into(), rows),
        ])?;

        let canonical = Self::canonicalize(df.lazy()).collect()?;
        let order = canonical
            .column("row")?
            .u32()?
            .iter()
            .flatten()
            .map(|r| r as usize)
            .collect();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn epoch_days_roundtrip() {
        assert_eq!(epoch_days(d("1970-01-01")), 0);
        assert_eq!(epoch_days(d("1970-01-02")), 1);
        assert_eq!(from_epoch_days(19_723), Some(d("2024-01-01")));
    }

    #[test]
    fn canonical_order_sorts_data() {
        let dates = [d("2024-01-04"), d("2024-01-02"), d("2024-01-03")];
        let order = Canonicalizer::canonical_order(&dates).unwrap();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn canonical_order_keeps_last_duplicate() {
        let dates = [d("2024-01-02"), d("2024-01-03"), d("2024-01-02")];
        let order = Canonicalizer::canonical_order(&dates).unwrap();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn canonical_order_empty() {
        assert!(Canonicalizer::canonical_order(&[]).unwrap().is_empty());
    }
}
