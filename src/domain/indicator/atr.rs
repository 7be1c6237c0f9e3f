//! Average True Range.
//!
//! TR[0] = high[0] - low[0]
//! TR[i] = max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR(n) = SMA(TR, n). Warmup: first (n-1) bars are invalid.

use crate::domain::bar::Bar;
use crate::domain::indicator::{rolling_mean, IndicatorSeries, IndicatorType};

pub fn true_range_series(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    let tr: Vec<Option<f64>> = true_range_series(bars).into_iter().map(Some).collect();
    IndicatorSeries::from_values(IndicatorType::Atr(period), bars, &rolling_mean(&tr, period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bar(i: usize, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            instrument: "TEST".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(15 * i as i64),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn true_range_first_bar_uses_high_low() {
        let bars = vec![make_bar(0, 110.0, 100.0, 105.0)];
        assert_eq!(true_range_series(&bars), vec![10.0]);
    }

    #[test]
    fn true_range_handles_gaps() {
        let bars = vec![
            make_bar(0, 110.0, 100.0, 105.0),
            make_bar(1, 130.0, 120.0, 125.0),
            make_bar(2, 120.0, 110.0, 115.0),
        ];
        // bar1: max(10, |130-105|=25, |120-105|=15) = 25
        // bar2: max(10, |120-125|=5, |110-125|=15) = 15
        assert_eq!(true_range_series(&bars), vec![10.0, 25.0, 15.0]);
    }

    #[test]
    fn atr_warmup() {
        let bars: Vec<Bar> = (0..5).map(|i| make_bar(i, 110.0, 90.0, 100.0)).collect();
        let series = calculate_atr(&bars, 3);

        assert_eq!(series.len(), 5);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn atr_is_simple_mean_of_true_range() {
        let bars = vec![
            make_bar(0, 110.0, 100.0, 105.0),
            make_bar(1, 130.0, 120.0, 125.0),
            make_bar(2, 120.0, 110.0, 115.0),
            make_bar(3, 118.0, 112.0, 116.0),
        ];
        // TR = [10, 25, 15, 6]
        let series = calculate_atr(&bars, 2);
        assert_eq!(series.value_at(0), None);
        assert_relative_eq!(series.value_at(1).unwrap(), 17.5);
        assert_relative_eq!(series.value_at(2).unwrap(), 20.0);
        assert_relative_eq!(series.value_at(3).unwrap(), 10.5);
    }

    #[test]
    fn atr_insufficient_bars() {
        let bars: Vec<Bar> = (0..2).map(|i| make_bar(i, 110.0, 90.0, 100.0)).collect();
        let series = calculate_atr(&bars, 5);
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_valid(), None);
    }
}
