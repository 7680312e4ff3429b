//! Simple and exponential moving averages.
//!
//! Both are defined from the first row: the SMA averages however many
//! observations the trailing window holds so far, and the EMA is seeded
//! with the first close.

use super::effective_window;
use crate::domain::PriceSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Trailing mean over up to `window` values, ignoring NaN.
///
/// NaN only where the window holds no valid value.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = effective_window(window);
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let (sum, count) = values[lo..=i]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}

/// Recursive EMA with `alpha = 2 / (window + 1)` over raw values.
///
/// Seeded with the first valid value; a NaN input repeats the previous EMA.
pub fn ema_of_values(values: &[f64], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (effective_window(window) as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &value in values {
        let next = match (prev, value.is_nan()) {
            (None, true) => None,
            (None, false) => Some(value),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(alpha * value + (1.0 - alpha) * p),
        };
        result.push(next.unwrap_or(f64::NAN));
        prev = next;
    }
    result
}

/// SMA of the close series; same length as the input.
pub fn sma(series: &PriceSeries, window: usize) -> Vec<f64> {
    rolling_mean(&series.closes(), window)
}

/// EMA of the close series; `ema[0] == close[0]`.
pub fn ema(series: &PriceSeries, window: usize) -> Vec<f64> {
    ema_of_values(&series.closes(), window)
}

/// One row of the price/average overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayRow {
    pub trade_date: NaiveDate,
    pub close_price: f64,
    pub sma: f64,
    pub ema: f64,
}

/// Close, SMA and EMA per date, both averages over `window`.
pub fn overlay(series: &PriceSeries, window: usize) -> Vec<OverlayRow> {
    overlay_with(series, window, window)
}

/// Like [`overlay`] with separate SMA and EMA windows.
pub fn overlay_with(series: &PriceSeries, sma_window: usize, ema_window: usize) -> Vec<OverlayRow> {
    let sma = sma(series, sma_window);
    let ema = ema(series, ema_window);
    series
        .records()
        .iter()
        .zip(sma)
        .zip(ema)
        .map(|((r, sma), ema)| OverlayRow {
            trade_date: r.trade_date,
            close_price: r.close_price,
            sma,
            ema,
        })
        .collect()
}
