//! Trend-following entry hints.

use super::moving_average::sma;
use crate::domain::PriceSeries;
use chrono::NaiveDate;

/// SMA window behind [`best_time_to_invest`].
pub const TREND_WINDOW: usize = 20;

/// Dates where the close is strictly above its `window`-day SMA.
pub fn above_moving_average(series: &PriceSeries, window: usize) -> Vec<NaiveDate> {
    series
        .records()
        .iter()
        .zip(sma(series, window))
        .filter(|(r, avg)| r.close_price > *avg)
        .map(|(r, _)| r.trade_date)
        .collect()
}

/// Dates where the close is above its 20-day SMA.
pub fn best_time_to_invest(series: &PriceSeries) -> Vec<NaiveDate> {
    above_moving_average(series, TREND_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_closes_sit_above_average() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        let series = PriceSeries::from_closes(
            "X",
            &[(d(3), 10.0), (d(4), 11.0), (d(5), 9.0), (d(6), 12.0), (d(7), f64::NAN)],
        );
        // first row equals its own average, so it is not strictly above
        assert_eq!(best_time_to_invest(&series), vec![d(4), d(6)]);
        assert_eq!(above_moving_average(&series, 1), Vec::<NaiveDate>::new());
    }
}
