//! Append-only trade records and the in-memory ledger used by backtests.

use chrono::{DateTime, Utc};

use crate::domain::error::PairtraderError;
use crate::domain::metrics::ExpectancyStats;
use crate::domain::position::Position;
use crate::domain::signal::Direction;

/// Fields fixed when a trade is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub instrument: String,
    pub direction: Direction,
    pub units: i64,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub entry_time: DateTime<Utc>,
}

/// Fields written once when a trade is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitFields {
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub profit: f64,
    pub profit_ratio: f64,
    pub expectancy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: i64,
    pub entry: TradeEntry,
    pub exit: Option<ExitFields>,
}

impl From<&Position> for TradeEntry {
    fn from(p: &Position) -> Self {
        TradeEntry {
            instrument: p.instrument.clone(),
            direction: p.direction,
            units: p.units,
            entry_price: p.entry_price,
            stop_loss_price: p.stop_loss_price,
            entry_time: p.entry_time,
        }
    }
}

impl TradeEntry {
    /// Per-unit profit and profit ratio of exiting at `exit_price`.
    pub fn profit_at(&self, exit_price: f64) -> (f64, f64) {
        let profit = self.direction.sign() * (exit_price - self.entry_price);
        let profit_ratio = if self.entry_price == 0.0 {
            0.0
        } else {
            profit / self.entry_price
        };
        (profit, profit_ratio)
    }
}

impl TradeRecord {
    pub fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    pub fn profit(&self) -> Option<f64> {
        self.exit.as_ref().map(|e| e.profit)
    }

    /// Profit in account currency: per-unit profit times units.
    pub fn pnl(&self) -> Option<f64> {
        self.profit().map(|p| p * self.entry.units as f64)
    }
}

/// Exit fields for closing `entry` at `exit_price`, with the expectancy
/// snapshot taken over `closed_before` plus this trade.
pub fn build_exit(
    entry: &TradeEntry,
    exit_price: f64,
    exit_time: DateTime<Utc>,
    closed_before: &[f64],
) -> ExitFields {
    let (profit, profit_ratio) = entry.profit_at(exit_price);
    let mut profits = closed_before.to_vec();
    profits.push(profit);
    ExitFields {
        exit_price,
        exit_time,
        profit,
        profit_ratio,
        expectancy: ExpectancyStats::from_profits(&profits).expectancy,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TradeLedger {
    records: Vec<TradeRecord>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_trade(&mut self, entry: TradeEntry) -> i64 {
        let id = self.records.len() as i64 + 1;
        self.records.push(TradeRecord {
            id,
            entry,
            exit: None,
        });
        id
    }

    pub fn close_trade(
        &mut self,
        id: i64,
        exit_price: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<&ExitFields, PairtraderError> {
        let closed_before = self.closed_profits();
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(PairtraderError::UnknownTrade { id })?;
        if record.exit.is_some() {
            return Err(PairtraderError::TradeAlreadyClosed { id });
        }
        let exit = build_exit(&record.entry, exit_price, exit_time, &closed_before);
        Ok(&*record.exit.insert(exit))
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn open_record(&self) -> Option<&TradeRecord> {
        self.records.iter().rev().find(|r| !r.is_closed())
    }

    pub fn closed(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter(|r| r.is_closed())
    }

    pub fn closed_profits(&self) -> Vec<f64> {
        self.closed().filter_map(TradeRecord::profit).collect()
    }

    pub fn expectancy(&self) -> ExpectancyStats {
        ExpectancyStats::compute(&self.records)
    }
}
