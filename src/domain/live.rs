//! Live trading loop driven through the broker, market-data and ledger ports.
//!
//! Each cycle reconciles the local position with the broker, evaluates the
//! latest bar, and issues at most one entry or exit. New state is built
//! locally and committed only after every port call in the cycle succeeded,
//! so a failed cycle is simply retried on the next tick. A broker close is
//! the exception: once the broker has filled it, the fill is held as a
//! pending close until the ledger accepts it.
//!
//! The backtest gate is re-evaluated on a schedule. While it is closed no
//! new position is opened, but an open one is still managed to its exit.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::domain::backtest::{run_backtest, BacktestConfig};
use crate::domain::bar::Bar;
use crate::domain::error::PairtraderError;
use crate::domain::ledger::{build_exit, TradeEntry, TradeRecord};
use crate::domain::pair_data::PairData;
use crate::domain::position::{step, ExitReason, Position, StepInput, StepOutcome};
use crate::domain::signal::{signal_at, Direction, SignalOutput};
use crate::domain::strategy::StrategyConfig;
use crate::ports::broker_port::{BrokerPort, BrokerTrade};
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// The managed position together with its broker and ledger handles.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTrade {
    pub position: Position,
    pub broker_trade_id: String,
    pub ledger_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub signal: Option<SignalOutput>,
    pub outcome: StepOutcome,
}

/// How often the live gate is re-checked, and with which backtest settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSchedule {
    pub backtest: BacktestConfig,
    pub interval: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq)]
struct Gate {
    schedule: GateSchedule,
    open: bool,
    checked_at: DateTime<Utc>,
}

/// A broker close whose ledger update has not gone through yet.
#[derive(Debug, Clone, PartialEq)]
struct PendingClose {
    ledger_id: i64,
    entry: TradeEntry,
    exit_price: f64,
    exit_time: DateTime<Utc>,
}

pub struct LiveTrader<'a> {
    strategy: StrategyConfig,
    bar_count: usize,
    market: &'a dyn MarketDataPort,
    broker: &'a dyn BrokerPort,
    ledger: &'a dyn LedgerPort,
    open: Option<OpenTrade>,
    pending_close: Option<PendingClose>,
    gate: Option<Gate>,
}

impl<'a> LiveTrader<'a> {
    pub fn new(
        strategy: StrategyConfig,
        bar_count: usize,
        market: &'a dyn MarketDataPort,
        broker: &'a dyn BrokerPort,
        ledger: &'a dyn LedgerPort,
    ) -> Self {
        Self {
            strategy,
            bar_count,
            market,
            broker,
            ledger,
            open: None,
            pending_close: None,
            gate: None,
        }
    }

    /// Re-run the backtest gate every `schedule.interval`, starting from a
    /// result obtained at `checked_at`.
    pub fn with_gate(
        mut self,
        schedule: GateSchedule,
        open: bool,
        checked_at: DateTime<Utc>,
    ) -> Self {
        self.gate = Some(Gate {
            schedule,
            open,
            checked_at,
        });
        self
    }

    /// Whether new positions may be opened. Always true without a gate.
    pub fn gate_open(&self) -> bool {
        self.gate.as_ref().map_or(true, |g| g.open)
    }

    pub fn open_trade(&self) -> Option<&OpenTrade> {
        self.open.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.open.as_ref().map(|t| &t.position)
    }

    /// Align local state with what the broker and ledger report.
    ///
    /// A locally tracked trade the broker no longer holds was stopped out
    /// broker-side and is closed in the ledger at its stop price. A broker
    /// trade unknown locally (e.g. after a restart) is adopted. A pending
    /// close is written first so its fill is never replaced by the stop.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Result<(), PairtraderError> {
        self.flush_pending_close()?;

        let broker_trades = self.broker.get_open_positions(&self.strategy.instrument)?;
        let records = self.ledger.list_trades()?;
        let ledger_open = records
            .iter()
            .rev()
            .find(|r| !r.is_closed() && r.entry.instrument == self.strategy.instrument);

        let next = match (&self.open, broker_trades.first()) {
            (Some(open), _) if broker_trades.iter().any(|t| t.id == open.broker_trade_id) => {
                Some(open.clone())
            }
            (Some(open), _) => {
                warn!(
                    "broker no longer holds trade {}; recording stop-out at {:.5}",
                    open.broker_trade_id, open.position.stop_loss_price
                );
                self.close_in_ledger(
                    open.ledger_id,
                    &TradeEntry::from(&open.position),
                    open.position.stop_loss_price,
                    now,
                    &records,
                )?;
                None
            }
            (None, Some(trade)) => Some(self.adopt(trade, ledger_open, now)?),
            (None, None) => {
                if let Some(record) = ledger_open {
                    warn!(
                        "ledger trade {} open without a broker position; closing at stop {:.5}",
                        record.id, record.entry.stop_loss_price
                    );
                    self.close_in_ledger(
                        record.id,
                        &record.entry,
                        record.entry.stop_loss_price,
                        now,
                        &records,
                    )?;
                }
                None
            }
        };

        self.open = next;
        Ok(())
    }

    fn adopt(
        &self,
        trade: &BrokerTrade,
        ledger_open: Option<&TradeRecord>,
        now: DateTime<Utc>,
    ) -> Result<OpenTrade, PairtraderError> {
        let direction = Direction::from_units(trade.units).ok_or_else(|| {
            PairtraderError::data_integrity(
                &self.strategy.instrument,
                format!("broker trade {} has zero units", trade.id),
            )
        })?;
        let stop = trade
            .stop_price
            .or(ledger_open.map(|r| r.entry.stop_loss_price))
            .ok_or_else(|| {
                PairtraderError::data_integrity(
                    &self.strategy.instrument,
                    format!("broker trade {} has no stop-loss", trade.id),
                )
            })?;

        let position = Position {
            instrument: self.strategy.instrument.clone(),
            direction,
            entry_price: ledger_open.map_or(trade.entry_price, |r| r.entry.entry_price),
            stop_loss_price: stop,
            units: trade.units.abs(),
            entry_time: ledger_open.map_or(now, |r| r.entry.entry_time),
        };
        let ledger_id = match ledger_open {
            Some(record) => record.id,
            None => self.ledger.append_trade(&TradeEntry::from(&position))?,
        };
        warn!(
            "adopted broker trade {} as {} {} units, stop {:.5} (ledger {})",
            trade.id, position.direction, position.units, stop, ledger_id
        );
        Ok(OpenTrade {
            position,
            broker_trade_id: trade.id.clone(),
            ledger_id,
        })
    }

    fn close_in_ledger(
        &self,
        ledger_id: i64,
        entry: &TradeEntry,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        records: &[TradeRecord],
    ) -> Result<(), PairtraderError> {
        let closed: Vec<f64> = records
            .iter()
            .filter(|r| r.id != ledger_id)
            .filter_map(TradeRecord::profit)
            .collect();
        let exit = build_exit(entry, exit_price, exit_time, &closed);
        self.ledger.update_trade(ledger_id, &exit)?;
        info!(
            "ledger trade {} closed at {:.5}, profit {:.5}, expectancy {:.5}",
            ledger_id, exit.exit_price, exit.profit, exit.expectancy
        );
        Ok(())
    }

    fn flush_pending_close(&mut self) -> Result<(), PairtraderError> {
        let Some(pending) = &self.pending_close else {
            return Ok(());
        };
        let records = self.ledger.list_trades()?;
        match self.close_in_ledger(
            pending.ledger_id,
            &pending.entry,
            pending.exit_price,
            pending.exit_time,
            &records,
        ) {
            Ok(()) => {}
            Err(PairtraderError::TradeAlreadyClosed { id }) => {
                warn!("ledger trade {} was already closed; dropping pending close", id);
            }
            Err(e) => return Err(e),
        }
        self.pending_close = None;
        Ok(())
    }

    /// Re-run the backtest gate over the latest history.
    pub fn regate(&mut self, now: DateTime<Utc>) -> Result<bool, PairtraderError> {
        let s = &self.strategy;
        let traded = self.market.get_bars(&s.instrument, s.granularity, self.bar_count)?;
        let reference = self.market.get_bars(&s.reference, s.granularity, self.bar_count)?;
        self.regate_with(&traded, &reference, now)
    }

    fn regate_with(
        &mut self,
        traded: &[Bar],
        reference: &[Bar],
        now: DateTime<Utc>,
    ) -> Result<bool, PairtraderError> {
        let Some(gate) = &self.gate else {
            return Ok(true);
        };
        let result = run_backtest(traded, reference, &self.strategy, &gate.schedule.backtest)?;
        let open = result.live_trading_enabled();
        if open != gate.open {
            warn!(
                "live gate {} at expectancy {:.5}",
                if open { "reopened" } else { "closed" },
                result.expectancy.expectancy
            );
        } else {
            info!("live gate re-checked, expectancy {:.5}", result.expectancy.expectancy);
        }
        let next = Gate {
            open,
            checked_at: now,
            ..gate.clone()
        };
        self.gate = Some(next);
        Ok(open)
    }

    fn gate_due(&self, now: DateTime<Utc>) -> bool {
        self.gate
            .as_ref()
            .is_some_and(|g| now - g.checked_at >= g.schedule.interval)
    }

    /// One fetch-evaluate-act pass.
    pub fn run_cycle(&mut self) -> Result<CycleReport, PairtraderError> {
        self.run_cycle_at(Utc::now())
    }

    /// One pass with `now` as the wall-clock time for reconciliation and
    /// gate scheduling.
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport, PairtraderError> {
        self.reconcile(now)?;

        let s = &self.strategy;
        let traded = self.market.get_bars(&s.instrument, s.granularity, self.bar_count)?;
        let reference = self.market.get_bars(&s.reference, s.granularity, self.bar_count)?;
        if self.gate_due(now) {
            self.regate_with(&traded, &reference, now)?;
        }

        let s = &self.strategy;
        let pair = PairData::build(&traded, &reference, &s.indicator_params())?;
        let minimum = s.warmup_bars();
        if pair.len() < minimum {
            return Err(PairtraderError::InsufficientData {
                instrument: format!("{}/{}", s.instrument, s.reference),
                bars: pair.len(),
                minimum,
            });
        }

        let last = pair.len() - 1;
        let timestamp = pair.bar(last).map(|b| b.timestamp).unwrap_or(now);
        let signal = signal_at(&pair, last, s.adx_threshold);
        let price = self.market.get_latest_price(&s.instrument)?;
        let balance = self.broker.get_balance()?;

        let input = StepInput {
            instrument: s.instrument.clone(),
            timestamp,
            price,
            atr: pair.traded.atr_at(last),
            signal,
            account_balance: balance,
        };
        let mut outcome = step(self.position().cloned(), &input, &s.position_params());
        if outcome.opened && !self.gate_open() {
            outcome = StepOutcome {
                rejected: Some("live trading gate closed".to_string()),
                ..StepOutcome::default()
            };
        }

        self.apply(&outcome, price)?;

        Ok(CycleReport {
            timestamp,
            price,
            signal,
            outcome,
        })
    }

    /// Carry out a step outcome against the broker and ledger.
    fn apply(&mut self, outcome: &StepOutcome, price: f64) -> Result<(), PairtraderError> {
        let instrument = self.strategy.instrument.clone();

        if let Some(close) = &outcome.closed {
            let Some(open) = self.open.clone() else {
                return Ok(());
            };
            let fill = self.broker.close_position(&open.broker_trade_id)?;
            let exit_price = match close.reason {
                ExitReason::StopHit => close.exit_price,
                ExitReason::TrendExhausted => fill,
            };
            info!(
                "closed {} {} ({}) at {:.5}",
                close.position.direction,
                instrument,
                close.reason.as_str(),
                exit_price
            );
            self.open = None;
            self.pending_close = Some(PendingClose {
                ledger_id: open.ledger_id,
                entry: TradeEntry::from(&close.position),
                exit_price,
                exit_time: close.exit_time,
            });
            return self.flush_pending_close();
        }

        if let Some(reason) = &outcome.rejected {
            warn!("{} entry rejected: {}", instrument, reason);
        }

        self.open = match (&outcome.position, &self.open) {
            (Some(position), None) if outcome.opened => {
                let fill = self.broker.place_market_order(
                    &instrument,
                    position.signed_units(),
                    position.stop_loss_price,
                )?;
                let position = Position {
                    entry_price: fill.price,
                    ..position.clone()
                };
                let ledger_id = self.ledger.append_trade(&TradeEntry::from(&position))?;
                info!(
                    "opened {} {} units of {} at {:.5} (quoted {:.5}), stop {:.5}",
                    position.direction, position.units, instrument, fill.price, price,
                    position.stop_loss_price
                );
                Some(OpenTrade {
                    position,
                    broker_trade_id: fill.trade_id,
                    ledger_id,
                })
            }
            (Some(position), Some(open)) => {
                if let Some(stop) = outcome.stop_moved {
                    self.broker.modify_stop(&open.broker_trade_id, stop)?;
                    debug!("trailing stop for {} moved to {:.5}", open.broker_trade_id, stop);
                }
                Some(OpenTrade {
                    position: position.clone(),
                    ..open.clone()
                })
            }
            _ => None,
        };
        Ok(())
    }

    /// Run cycles every `interval` until `stop` is set.
    ///
    /// Transient failures abort only the current cycle. Anything else ends
    /// the loop with that error.
    pub fn run(&mut self, stop: &AtomicBool, interval: Duration) -> Result<(), PairtraderError> {
        info!(
            "live trading {} against {} every {:?}",
            self.strategy.instrument, self.strategy.reference, interval
        );
        while !stop.load(Ordering::SeqCst) {
            match self.run_cycle() {
                Ok(report) => debug!(
                    "cycle at {}: price {:.5}, signal {:?}",
                    report.timestamp, report.price, report.signal
                ),
                Err(e) if e.is_transient() => error!("cycle aborted: {}", e),
                Err(e) => return Err(e),
            }
            sleep_until_stopped(stop, interval);
        }
        info!("live trading stopped");
        Ok(())
    }
}

/// Sleep for `duration`, waking early once `stop` is set.
pub fn sleep_until_stopped(stop: &AtomicBool, duration: Duration) {
    let mut remaining = duration;
    while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
        let slice = remaining.min(SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}
