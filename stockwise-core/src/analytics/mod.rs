//! Pure analytics over [`PriceSeries`](crate::domain::PriceSeries).
//!
//! Nothing here touches the store. Missing (NaN) closes are skipped by the
//! windowed statistics, and a window of 0 behaves as 1.

pub mod abrupt;
pub mod align;
pub mod correlation;
pub mod moving_average;
pub mod signals;
pub mod volatility;

pub use abrupt::{abrupt_changes, pct_changes, AbruptChange};
pub use align::{align, AlignedSeries};
pub use correlation::{correlate, pearson, CorrelationMatrix};
pub use moving_average::{ema, overlay, overlay_with, rolling_mean, sma, OverlayRow};
pub use signals::{above_moving_average, best_time_to_invest, TREND_WINDOW};
pub use volatility::{rolling_std, volatility_and_risk, RiskPoint};

pub(crate) fn effective_window(window: usize) -> usize {
    window.max(1)
}
