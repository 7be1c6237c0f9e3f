//! Price bar representation and sequence validation.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::PairtraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Rejects sequences whose timestamps are not strictly increasing, whose
/// prices are not finite, or whose volume is negative or not finite. Gaps
/// between bars are allowed.
pub fn validate_bars(instrument: &str, bars: &[Bar]) -> Result<(), PairtraderError> {
    for (i, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(PairtraderError::data_integrity(
                instrument,
                format!("non-finite price in bar at {}", bar.timestamp),
            ));
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(PairtraderError::data_integrity(
                instrument,
                format!("invalid volume {} in bar at {}", bar.volume, bar.timestamp),
            ));
        }
        if bar.high < bar.low {
            return Err(PairtraderError::data_integrity(
                instrument,
                format!("high below low in bar at {}", bar.timestamp),
            ));
        }
        if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
            return Err(PairtraderError::data_integrity(
                instrument,
                format!(
                    "timestamps not strictly increasing: {} follows {}",
                    bar.timestamp,
                    bars[i - 1].timestamp
                ),
            ));
        }
    }
    Ok(())
}

/// Candle granularity, named the way brokers label them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    S5,
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D,
}

impl Granularity {
    pub fn interval(&self) -> Duration {
        match self {
            Granularity::S5 => Duration::seconds(5),
            Granularity::M1 => Duration::minutes(1),
            Granularity::M5 => Duration::minutes(5),
            Granularity::M15 => Duration::minutes(15),
            Granularity::M30 => Duration::minutes(30),
            Granularity::H1 => Duration::hours(1),
            Granularity::H4 => Duration::hours(4),
            Granularity::D => Duration::days(1),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Granularity::S5 => "S5",
            Granularity::M1 => "M1",
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::M30 => "M30",
            Granularity::H1 => "H1",
            Granularity::H4 => "H4",
            Granularity::D => "D",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "S5" => Ok(Granularity::S5),
            "M1" => Ok(Granularity::M1),
            "M5" => Ok(Granularity::M5),
            "M15" => Ok(Granularity::M15),
            "M30" => Ok(Granularity::M30),
            "H1" => Ok(Granularity::H1),
            "H4" => Ok(Granularity::H4),
            "D" => Ok(Granularity::D),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}
