//! Historical replay of the strategy (single forward scan).
//!
//! Bars of both instruments are inner-joined on timestamp, indicators are
//! computed once, and the position state machine is stepped bar by bar.
//! Fills are simulated at the traded close; sizing uses realized equity.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::domain::bar::Bar;
use crate::domain::error::PairtraderError;
use crate::domain::ledger::{TradeEntry, TradeLedger};
use crate::domain::metrics::{EquityPoint, EquitySummary, ExpectancyStats};
use crate::domain::pair_data::PairData;
use crate::domain::position::{step, Position, StepInput};
use crate::domain::signal::{signal_at, Direction, Signal};
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_balance: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
        }
    }
}

/// State after one bar of the replay.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    /// `None` during warm-up.
    pub signal: Option<Signal>,
    pub exit_flag: bool,
    pub position: Option<Direction>,
    pub stop_loss: Option<f64>,
    pub equity: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: TradeLedger,
    pub steps: Vec<StepRecord>,
    /// Realized balance plus the open position's unrealized PnL.
    pub equity_curve: Vec<EquityPoint>,
    /// Left open when the data ran out; never force-closed.
    pub open_position: Option<Position>,
    pub realized_balance: f64,
    pub expectancy: ExpectancyStats,
    pub summary: EquitySummary,
}

impl BacktestResult {
    pub fn live_trading_enabled(&self) -> bool {
        self.expectancy.expectancy > 0.0
    }
}

pub fn run_backtest(
    traded: &[Bar],
    reference: &[Bar],
    strategy: &StrategyConfig,
    config: &BacktestConfig,
) -> Result<BacktestResult, PairtraderError> {
    let pair = PairData::build(traded, reference, &strategy.indicator_params())?;
    let minimum = strategy.warmup_bars();
    if pair.len() < minimum {
        return Err(PairtraderError::InsufficientData {
            instrument: format!("{}/{}", strategy.instrument, strategy.reference),
            bars: pair.len(),
            minimum,
        });
    }

    let params = strategy.position_params();
    let mut ledger = TradeLedger::new();
    let mut balance = config.initial_balance;
    let mut position: Option<Position> = None;
    let mut open_id: Option<i64> = None;
    let mut steps = Vec::with_capacity(pair.len());
    let mut equity_curve = Vec::with_capacity(pair.len());

    for (i, bar) in pair.traded.bars.iter().enumerate() {
        let signal = signal_at(&pair, i, strategy.adx_threshold);
        let input = StepInput {
            instrument: strategy.instrument.clone(),
            timestamp: bar.timestamp,
            price: bar.close,
            atr: pair.traded.atr_at(i),
            signal,
            account_balance: balance,
        };

        let outcome = step(position.take(), &input, &params);

        if let Some(close) = &outcome.closed {
            if let Some(id) = open_id.take() {
                let exit = ledger.close_trade(id, close.exit_price, close.exit_time)?;
                balance += exit.profit * close.position.units as f64;
                debug!(
                    "{} closed {} at {:.5} ({}), profit {:.5}",
                    bar.timestamp,
                    close.position.direction,
                    close.exit_price,
                    close.reason.as_str(),
                    exit.profit
                );
            }
        }
        if let Some(stop) = outcome.stop_moved {
            debug!("{} trailing stop moved to {:.5}", bar.timestamp, stop);
        }
        if let Some(reason) = &outcome.rejected {
            warn!("{} entry rejected: {}", bar.timestamp, reason);
        }
        if outcome.opened {
            if let Some(p) = &outcome.position {
                open_id = Some(ledger.open_trade(TradeEntry::from(p)));
                debug!(
                    "{} opened {} {} units at {:.5}, stop {:.5}",
                    bar.timestamp, p.direction, p.units, p.entry_price, p.stop_loss_price
                );
            }
        }

        position = outcome.position;
        let equity = balance
            + position
                .as_ref()
                .map(|p| p.unrealized_pnl(bar.close))
                .unwrap_or(0.0);

        steps.push(StepRecord {
            timestamp: bar.timestamp,
            close: bar.close,
            signal: signal.map(|s| s.signal),
            exit_flag: signal.is_some_and(|s| s.exit),
            position: position.as_ref().map(|p| p.direction),
            stop_loss: position.as_ref().map(|p| p.stop_loss_price),
            equity,
        });
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity,
        });
    }

    let expectancy = ledger.expectancy();
    let summary = EquitySummary::compute(&equity_curve, config.initial_balance);
    info!(
        "backtest {} vs {}: {} bars, {} closed trades, expectancy {:.5}",
        strategy.instrument,
        strategy.reference,
        pair.len(),
        expectancy.trades,
        expectancy.expectancy
    );

    Ok(BacktestResult {
        ledger,
        steps,
        equity_curve,
        open_position: position,
        realized_balance: balance,
        expectancy,
        summary,
    })
}
