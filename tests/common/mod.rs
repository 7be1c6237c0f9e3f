#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use pairtrader::domain::bar::{Bar, Granularity};
use pairtrader::domain::error::PairtraderError;
use pairtrader::domain::ledger::{ExitFields, TradeEntry, TradeRecord};
use pairtrader::ports::broker_port::{BrokerPort, BrokerTrade, OrderFill};
use pairtrader::ports::ledger_port::LedgerPort;
use pairtrader::ports::market_data_port::MarketDataPort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn make_bar(instrument: &str, i: usize, close: f64) -> Bar {
    Bar {
        instrument: instrument.to_string(),
        timestamp: start_time() + Duration::minutes(i as i64),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 1000.0 + 10.0 * i as f64,
    }
}

/// EUR_USD falls one point a bar from 200 while USD_IDX climbs from 100.
/// The 51st traded bar jumps to 171, through the trailing stop.
pub fn divergent_pair() -> (Vec<Bar>, Vec<Bar>) {
    let traded = (0..51)
        .map(|i| {
            let close = if i < 50 { 200.0 - i as f64 } else { 171.0 };
            make_bar("EUR_USD", i, close)
        })
        .collect();
    let reference = (0..51)
        .map(|i| make_bar("USD_IDX", i, 100.0 + i as f64))
        .collect();
    (traded, reference)
}

/// The divergent fixture up to the 27th bar, then EUR_USD goes flat at 173
/// for 52 bars in total. Its ADX decays below 25 on the last bar, which ends
/// the trade on trend exhaustion without touching the trailing stop.
pub fn exhaustion_pair() -> (Vec<Bar>, Vec<Bar>) {
    let traded = (0..52)
        .map(|i| {
            let close = if i < 27 { 200.0 - i as f64 } else { 173.0 };
            make_bar("EUR_USD", i, close)
        })
        .collect();
    let reference = (0..52)
        .map(|i| make_bar("USD_IDX", i, 100.0 + i as f64))
        .collect();
    (traded, reference)
}

/// Both instruments rise together, so no divergence signal ever fires.
pub fn parallel_pair(count: usize) -> (Vec<Bar>, Vec<Bar>) {
    let traded = (0..count)
        .map(|i| make_bar("EUR_USD", i, 100.0 + i as f64))
        .collect();
    let reference = (0..count)
        .map(|i| make_bar("USD_IDX", i, 50.0 + i as f64))
        .collect();
    (traded, reference)
}

pub fn bars_to_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.to_rfc3339(),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}

pub struct MockMarketData {
    pub bars: RefCell<HashMap<String, Vec<Bar>>>,
    pub unavailable: Cell<bool>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            bars: RefCell::new(HashMap::new()),
            unavailable: Cell::new(false),
        }
    }

    pub fn with_bars(self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.set_bars(instrument, bars);
        self
    }

    pub fn set_bars(&self, instrument: &str, bars: Vec<Bar>) {
        self.bars.borrow_mut().insert(instrument.to_string(), bars);
    }
}

impl MarketDataPort for MockMarketData {
    fn get_bars(
        &self,
        instrument: &str,
        _granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Bar>, PairtraderError> {
        if self.unavailable.get() {
            return Err(PairtraderError::unavailable("market data", "feed down"));
        }
        let bars = self.bars.borrow().get(instrument).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }

    fn get_latest_price(&self, instrument: &str) -> Result<f64, PairtraderError> {
        if self.unavailable.get() {
            return Err(PairtraderError::unavailable("market data", "feed down"));
        }
        self.bars
            .borrow()
            .get(instrument)
            .and_then(|bars| bars.last())
            .map(|b| b.close)
            .ok_or_else(|| PairtraderError::unavailable("market data", "no bars"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub instrument: String,
    pub units: i64,
    pub stop_loss: f64,
}

pub struct MockBroker {
    pub balance: Cell<f64>,
    pub fill_price: Cell<f64>,
    pub next_id: Cell<u64>,
    pub open: RefCell<Vec<BrokerTrade>>,
    pub orders: RefCell<Vec<PlacedOrder>>,
    pub stop_updates: RefCell<Vec<(String, f64)>>,
    pub closed: RefCell<Vec<String>>,
}

impl MockBroker {
    pub fn new(balance: f64) -> Self {
        Self {
            balance: Cell::new(balance),
            fill_price: Cell::new(0.0),
            next_id: Cell::new(1),
            open: RefCell::new(Vec::new()),
            orders: RefCell::new(Vec::new()),
            stop_updates: RefCell::new(Vec::new()),
            closed: RefCell::new(Vec::new()),
        }
    }

    /// Simulate a broker-side stop-out.
    pub fn drop_all_positions(&self) {
        self.open.borrow_mut().clear();
    }
}

impl BrokerPort for MockBroker {
    fn get_balance(&self) -> Result<f64, PairtraderError> {
        Ok(self.balance.get())
    }

    fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
    ) -> Result<OrderFill, PairtraderError> {
        let id = self.next_id.get().to_string();
        self.next_id.set(self.next_id.get() + 1);
        self.orders.borrow_mut().push(PlacedOrder {
            instrument: instrument.to_string(),
            units,
            stop_loss,
        });
        self.open.borrow_mut().push(BrokerTrade {
            id: id.clone(),
            units,
            entry_price: self.fill_price.get(),
            stop_price: Some(stop_loss),
        });
        Ok(OrderFill {
            trade_id: id,
            price: self.fill_price.get(),
        })
    }

    fn modify_stop(&self, trade_id: &str, stop_loss: f64) -> Result<(), PairtraderError> {
        let mut open = self.open.borrow_mut();
        let trade = open
            .iter_mut()
            .find(|t| t.id == trade_id)
            .ok_or_else(|| PairtraderError::unavailable("broker", "unknown trade"))?;
        trade.stop_price = Some(stop_loss);
        self.stop_updates
            .borrow_mut()
            .push((trade_id.to_string(), stop_loss));
        Ok(())
    }

    fn close_position(&self, trade_id: &str) -> Result<f64, PairtraderError> {
        self.open.borrow_mut().retain(|t| t.id != trade_id);
        self.closed.borrow_mut().push(trade_id.to_string());
        Ok(self.fill_price.get())
    }

    fn get_open_positions(&self, _instrument: &str) -> Result<Vec<BrokerTrade>, PairtraderError> {
        Ok(self.open.borrow().clone())
    }
}

pub struct MockLedger {
    pub records: RefCell<Vec<TradeRecord>>,
    /// Number of upcoming `update_trade` calls that fail as a locked database.
    pub fail_updates: Cell<u32>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            fail_updates: Cell::new(0),
        }
    }
}

impl LedgerPort for MockLedger {
    fn append_trade(&self, entry: &TradeEntry) -> Result<i64, PairtraderError> {
        let mut records = self.records.borrow_mut();
        let id = records.len() as i64 + 1;
        records.push(TradeRecord {
            id,
            entry: entry.clone(),
            exit: None,
        });
        Ok(id)
    }

    fn update_trade(&self, id: i64, exit: &ExitFields) -> Result<(), PairtraderError> {
        if self.fail_updates.get() > 0 {
            self.fail_updates.set(self.fail_updates.get() - 1);
            return Err(PairtraderError::Database {
                reason: "database is locked".into(),
            });
        }
        let mut records = self.records.borrow_mut();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(PairtraderError::UnknownTrade { id })?;
        if record.exit.is_some() {
            return Err(PairtraderError::TradeAlreadyClosed { id });
        }
        record.exit = Some(exit.clone());
        Ok(())
    }

    fn list_trades(&self) -> Result<Vec<TradeRecord>, PairtraderError> {
        Ok(self.records.borrow().clone())
    }
}
