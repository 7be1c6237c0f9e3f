//! Expectancy statistics and equity-curve summary.

use chrono::{DateTime, Utc};

use crate::domain::ledger::TradeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpectancyStats {
    pub trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Mean profit of non-winning trades; zero or negative.
    pub avg_loss: f64,
    pub expectancy: f64,
}

impl ExpectancyStats {
    /// Recomputed from scratch over the closed records; open ones are ignored.
    pub fn compute(records: &[TradeRecord]) -> Self {
        let profits: Vec<f64> = records.iter().filter_map(TradeRecord::profit).collect();
        Self::from_profits(&profits)
    }

    /// Winners have strictly positive profit; everything else is a loser.
    pub fn from_profits(profits: &[f64]) -> Self {
        if profits.is_empty() {
            return Self::default();
        }

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;

        for &profit in profits {
            if profit > 0.0 {
                wins += 1;
                total_wins += profit;
            } else {
                losses += 1;
                total_losses += profit;
            }
        }

        let trades = profits.len();
        let win_rate = wins as f64 / trades as f64;
        let avg_win = if wins > 0 {
            total_wins / wins as f64
        } else {
            0.0
        };
        let avg_loss = if losses > 0 {
            total_losses / losses as f64
        } else {
            0.0
        };

        ExpectancyStats {
            trades,
            win_rate,
            avg_win,
            avg_loss,
            expectancy: win_rate * avg_win - (1.0 - win_rate) * avg_loss.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquitySummary {
    pub total_return: f64,
    pub max_drawdown: f64,
    /// Longest run of points spent below a prior peak.
    pub max_drawdown_duration: i64,
}

impl EquitySummary {
    pub fn compute(equity_curve: &[EquityPoint], initial_balance: f64) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_balance);

        let total_return = if initial_balance > 0.0 {
            (final_equity - initial_balance) / initial_balance
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        EquitySummary {
            total_return,
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 && point.equity < peak {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}
