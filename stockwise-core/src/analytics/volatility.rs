//! Rolling volatility and price-relative risk.

use super::effective_window;
use crate::domain::PriceSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    pub trade_date: NaiveDate,
    pub close_price: f64,
    pub volatility: f64,
    /// `volatility / close_price`.
    pub risk: f64,
}

/// Trailing sample standard deviation (ddof = 1) over up to `window`
/// values, ignoring NaN. One observation gives 0, none gives NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let window = effective_window(window);
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            sample_std(values[lo..=i].iter().copied().filter(|v| !v.is_nan()))
        })
        .collect()
}

fn sample_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (mut n, mut sum) = (0usize, 0.0);
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values.clone() {
        n += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    match n {
        0 => f64::NAN,
        1 => 0.0,
        // Flat window; skip the rounding noise of the two-pass formula
        _ if min == max => 0.0,
        _ => {
            let mean = sum / n as f64;
            let ss: f64 = values.map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n - 1) as f64).sqrt()
        }
    }
}

/// Risk for a single point; NaN when the close is zero or missing.
pub fn risk(volatility: f64, close: f64) -> f64 {
    if close == 0.0 || close.is_nan() {
        f64::NAN
    } else {
        volatility / close
    }
}

pub fn volatility_and_risk(series: &PriceSeries, window: usize) -> Vec<RiskPoint> {
    let closes = series.closes();
    let vol = rolling_std(&closes, window);
    series
        .records()
        .iter()
        .zip(vol)
        .map(|(r, volatility)| RiskPoint {
            trade_date: r.trade_date,
            close_price: r.close_price,
            volatility,
            risk: risk(volatility, r.close_price),
        })
        .collect()
}
