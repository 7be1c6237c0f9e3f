//! Simple moving averages of close price and volume.
//!
//! SMA(n)[i] = sum(C[i-j] for j in 0..n) / n
//! Warmup: first (n-1) bars are invalid.

use crate::domain::bar::Bar;
use crate::domain::indicator::{rolling_mean, IndicatorSeries, IndicatorType};

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    IndicatorSeries::from_values(
        IndicatorType::Sma(period),
        bars,
        &rolling_mean(&closes, period),
    )
}

/// Trailing average volume, used as the "above-average volume" reference.
pub fn calculate_volume_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    let volumes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.volume)).collect();
    IndicatorSeries::from_values(
        IndicatorType::VolumeSma(period),
        bars,
        &rolling_mean(&volumes, period),
    )
}
