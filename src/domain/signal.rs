//! Divergence signal between the traded instrument and its reference.
//!
//! The two instruments are assumed negatively correlated. An entry needs both
//! to trend strongly in opposite directions on above-average volume.

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator_helpers::IndicatorSnapshot;
use crate::domain::pair_data::PairData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn from_units(units: i64) -> Option<Direction> {
        match units {
            u if u > 0 => Some(Direction::Long),
            u if u < 0 => Some(Direction::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

impl Signal {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOutput {
    pub signal: Signal,
    /// Either instrument's ADX fell below the threshold.
    pub exit: bool,
}

pub fn evaluate_signal(
    traded: &IndicatorSnapshot,
    reference: &IndicatorSnapshot,
    adx_threshold: f64,
) -> SignalOutput {
    let strong = |s: &IndicatorSnapshot| s.volume > s.volume_avg && s.adx > adx_threshold;
    let below = |s: &IndicatorSnapshot| s.close < s.sma;
    let above = |s: &IndicatorSnapshot| s.close > s.sma;

    let signal = if strong(traded) && strong(reference) {
        if below(traded) && above(reference) {
            Signal::Short
        } else if above(traded) && below(reference) {
            Signal::Long
        } else {
            Signal::Flat
        }
    } else {
        Signal::Flat
    };

    SignalOutput {
        signal,
        exit: traded.adx < adx_threshold || reference.adx < adx_threshold,
    }
}

/// `None` while either instrument is still warming up at `index`.
pub fn signal_at(pair: &PairData, index: usize, adx_threshold: f64) -> Option<SignalOutput> {
    let (traded, reference) = pair.snapshots(index)?;
    Some(evaluate_signal(&traded, &reference, adx_threshold))
}
