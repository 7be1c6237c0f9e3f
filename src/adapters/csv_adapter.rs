//! CSV file market-data adapter.
//!
//! One file per instrument and granularity: `{dir}/{instrument}_{granularity}.csv`
//! with header `timestamp,open,high,low,close,volume`, oldest row first.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::bar::{validate_bars, Bar, Granularity};
use crate::domain::error::PairtraderError;
use crate::ports::market_data_port::MarketDataPort;

pub struct CsvMarketData {
    base_path: PathBuf,
    granularity: Granularity,
}

impl CsvMarketData {
    /// `granularity` selects the file `get_latest_price` reads from.
    pub fn new(base_path: PathBuf, granularity: Granularity) -> Self {
        Self {
            base_path,
            granularity,
        }
    }

    fn csv_path(&self, instrument: &str, granularity: Granularity) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument, granularity))
    }

    fn read_bars(&self, instrument: &str, granularity: Granularity) -> Result<Vec<Bar>, PairtraderError> {
        let path = self.csv_path(instrument, granularity);
        let content = fs::read_to_string(&path).map_err(|e| {
            PairtraderError::unavailable(
                "market data",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| {
                PairtraderError::data_integrity(instrument, format!("CSV parse error: {}", e))
            })?;
            let line = row + 2;

            let ts_str = record.get(0).ok_or_else(|| {
                PairtraderError::data_integrity(instrument, format!("line {}: missing timestamp", line))
            })?;
            let timestamp = parse_timestamp(ts_str).ok_or_else(|| {
                PairtraderError::data_integrity(
                    instrument,
                    format!("line {}: invalid timestamp '{}'", line, ts_str),
                )
            })?;

            bars.push(Bar {
                instrument: instrument.to_string(),
                timestamp,
                open: parse_field(&record, 1, "open", instrument, line)?,
                high: parse_field(&record, 2, "high", instrument, line)?,
                low: parse_field(&record, 3, "low", instrument, line)?,
                close: parse_field(&record, 4, "close", instrument, line)?,
                volume: parse_field(&record, 5, "volume", instrument, line)?,
            });
        }

        validate_bars(instrument, &bars)?;
        Ok(bars)
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    instrument: &str,
    line: usize,
) -> Result<T, PairtraderError>
where
    T::Err: std::fmt::Display,
{
    let raw = record.get(index).ok_or_else(|| {
        PairtraderError::data_integrity(instrument, format!("line {}: missing {} column", line, name))
    })?;
    raw.trim().parse().map_err(|e: T::Err| {
        PairtraderError::data_integrity(
            instrument,
            format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
        )
    })
}

impl MarketDataPort for CsvMarketData {
    fn get_bars(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Bar>, PairtraderError> {
        let mut bars = self.read_bars(instrument, granularity)?;
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }

    fn get_latest_price(&self, instrument: &str) -> Result<f64, PairtraderError> {
        self.read_bars(instrument, self.granularity)?
            .last()
            .map(|b| b.close)
            .ok_or_else(|| {
                PairtraderError::unavailable("market data", format!("no bars for {}", instrument))
            })
    }
}
