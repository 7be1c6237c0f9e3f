//! Per-instrument indicator bundle and point-in-time snapshots.

use crate::domain::bar::Bar;
use crate::domain::indicator::adx::calculate_adx;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::sma::{calculate_sma, calculate_volume_sma};
use crate::domain::indicator::IndicatorSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub sma_period: usize,
    pub volume_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_period: 20,
            volume_period: 20,
            atr_period: 14,
            adx_period: 14,
        }
    }
}

impl IndicatorParams {
    /// Bars needed before every series in the set is valid.
    pub fn warmup_bars(&self) -> usize {
        self.sma_period
            .max(self.volume_period)
            .max(self.atr_period)
            .max((2 * self.adx_period).saturating_sub(1))
    }
}

/// Everything the signal rule reads for one instrument at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub volume: f64,
    pub sma: f64,
    pub volume_avg: f64,
    pub adx: f64,
    pub atr: f64,
}

#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub bars: Vec<Bar>,
    pub sma: IndicatorSeries,
    pub volume_avg: IndicatorSeries,
    pub atr: IndicatorSeries,
    pub adx: IndicatorSeries,
}

pub fn compute_indicator_set(bars: &[Bar], params: &IndicatorParams) -> IndicatorSet {
    IndicatorSet {
        bars: bars.to_vec(),
        sma: calculate_sma(bars, params.sma_period),
        volume_avg: calculate_volume_sma(bars, params.volume_period),
        atr: calculate_atr(bars, params.atr_period),
        adx: calculate_adx(bars, params.adx_period),
    }
}

impl IndicatorSet {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// `None` while any indicator at `index` is still warming up.
    pub fn snapshot(&self, index: usize) -> Option<IndicatorSnapshot> {
        let bar = self.bars.get(index)?;
        Some(IndicatorSnapshot {
            close: bar.close,
            volume: bar.volume,
            sma: self.sma.value_at(index)?,
            volume_avg: self.volume_avg.value_at(index)?,
            adx: self.adx.value_at(index)?,
            atr: self.atr.value_at(index)?,
        })
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        self.atr.value_at(index)
    }
}
