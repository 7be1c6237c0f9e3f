//! Technical indicator implementations.
//!
//! Every series is aligned index-for-index with the bars it was computed
//! from. Points still inside a rolling window's warm-up carry `valid = false`.
//! All smoothing is a simple trailing mean.

pub mod adx;
pub mod atr;
pub mod sma;

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::bar::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    VolumeSma(usize),
    TrueRange,
    Atr(usize),
    PlusDi(usize),
    MinusDi(usize),
    Dx(usize),
    Adx(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Pair raw optional values with the bar timestamps they belong to.
    pub fn from_values(indicator_type: IndicatorType, bars: &[Bar], raw: &[Option<f64>]) -> Self {
        let values = bars
            .iter()
            .zip(raw)
            .map(|(bar, value)| IndicatorPoint {
                timestamp: bar.timestamp,
                valid: value.is_some(),
                value: value.unwrap_or(0.0),
            })
            .collect();
        IndicatorSeries {
            indicator_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, or `None` while still warming up or out of range.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    /// Index of the first valid point.
    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::TrueRange => write!(f, "TR"),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::PlusDi(period) => write!(f, "+DI({})", period),
            IndicatorType::MinusDi(period) => write!(f, "-DI({})", period),
            IndicatorType::Dx(period) => write!(f, "DX({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
        }
    }
}

/// Trailing simple mean over `period` values. A window containing any
/// undefined value yields `None`, so warm-up propagates through chained
/// averages.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let sum = window.iter().copied().sum::<Option<f64>>()?;
            Some(sum / period as f64)
        })
        .collect()
}

/// `numerator / denominator`, defined as 0 when the denominator is 0.
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
