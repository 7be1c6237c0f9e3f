//! Directional movement and the Average Directional Index.
//!
//! +DM[i] = max(high[i] - high[i-1], 0), -DM[i] = max(low[i-1] - low[i], 0)
//! +DI = 100 * SMA(+DM, n) / SMA(TR, n), -DI symmetric
//! DX  = 100 * |+DI - -DI| / (+DI + -DI), 0 when both are 0
//! ADX = SMA(DX, n)
//! Warmup: DI and DX need n bars, ADX needs 2n-1.

use crate::domain::bar::Bar;
use crate::domain::indicator::atr::true_range_series;
use crate::domain::indicator::{ratio_or_zero, rolling_mean, IndicatorSeries, IndicatorType};

/// Full directional breakdown. Only `adx` feeds the signal rule; the rest is
/// kept for reporting and tests.
#[derive(Debug, Clone)]
pub struct DirectionalSeries {
    pub plus_di: IndicatorSeries,
    pub minus_di: IndicatorSeries,
    pub dx: IndicatorSeries,
    pub adx: IndicatorSeries,
}

/// (+DM, -DM) per bar; both are zero on the first bar.
pub fn directional_movement(bars: &[Bar]) -> (Vec<f64>, Vec<f64>) {
    let mut plus = Vec::with_capacity(bars.len());
    let mut minus = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if i == 0 {
            plus.push(0.0);
            minus.push(0.0);
        } else {
            let prev = &bars[i - 1];
            plus.push((bar.high - prev.high).max(0.0));
            minus.push((prev.low - bar.low).max(0.0));
        }
    }
    (plus, minus)
}

pub fn directional_index(plus_di: f64, minus_di: f64) -> f64 {
    100.0 * ratio_or_zero((plus_di - minus_di).abs(), plus_di + minus_di)
}

pub fn calculate_directional(bars: &[Bar], period: usize) -> DirectionalSeries {
    let (plus_dm, minus_dm) = directional_movement(bars);
    let wrap = |v: Vec<f64>| v.into_iter().map(Some).collect::<Vec<_>>();

    let tr_avg = rolling_mean(&wrap(true_range_series(bars)), period);
    let plus_avg = rolling_mean(&wrap(plus_dm), period);
    let minus_avg = rolling_mean(&wrap(minus_dm), period);

    let di = |dm: &[Option<f64>]| -> Vec<Option<f64>> {
        dm.iter()
            .zip(&tr_avg)
            .map(|(dm, tr)| Some(100.0 * ratio_or_zero((*dm)?, (*tr)?)))
            .collect()
    };
    let plus_di = di(&plus_avg);
    let minus_di = di(&minus_avg);

    let dx: Vec<Option<f64>> = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| Some(directional_index((*p)?, (*m)?)))
        .collect();
    let adx = rolling_mean(&dx, period);

    DirectionalSeries {
        plus_di: IndicatorSeries::from_values(IndicatorType::PlusDi(period), bars, &plus_di),
        minus_di: IndicatorSeries::from_values(IndicatorType::MinusDi(period), bars, &minus_di),
        dx: IndicatorSeries::from_values(IndicatorType::Dx(period), bars, &dx),
        adx: IndicatorSeries::from_values(IndicatorType::Adx(period), bars, &adx),
    }
}

pub fn calculate_adx(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate_directional(bars, period).adx
}
