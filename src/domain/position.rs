//! Single-position state machine with an ATR trailing stop.
//!
//! `step` is pure: the current position goes in, the next position and any
//! lifecycle events come out. Rules are applied in order each step:
//! 1. trail the stop, then close at the stop if price crossed it
//! 2. close at market if the exit flag is set
//! 3. open on a directional signal when flat
//!
//! A step that closes never opens.

use chrono::{DateTime, Utc};

use crate::domain::signal::{Direction, SignalOutput};
use crate::domain::sizing::calculate_units;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    /// Always positive; `direction` carries the sign.
    pub units: i64,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    pub fn signed_units(&self) -> i64 {
        match self.direction {
            Direction::Long => self.units,
            Direction::Short => -self.units,
        }
    }

    /// Per-unit profit of exiting at `price`.
    pub fn profit_per_unit(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.units as f64 * self.profit_per_unit(price)
    }

    /// Strict crossing: touching the stop does not trigger it.
    pub fn stop_crossed(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price < self.stop_loss_price,
            Direction::Short => price > self.stop_loss_price,
        }
    }

    /// The stop `distance` away from `price` on the losing side.
    pub fn stop_for(direction: Direction, price: f64, distance: f64) -> f64 {
        price - direction.sign() * distance
    }

    /// Some(new stop) if the candidate tightens the current one.
    pub fn tightened_stop(&self, candidate: f64) -> Option<f64> {
        let tighter = match self.direction {
            Direction::Long => candidate > self.stop_loss_price,
            Direction::Short => candidate < self.stop_loss_price,
        };
        tighter.then_some(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionParams {
    /// k in `price ∓ k·ATR`.
    pub atr_multiplier: f64,
    pub risk_fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub atr: Option<f64>,
    /// `None` while either instrument is warming up.
    pub signal: Option<SignalOutput>,
    pub account_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopHit,
    TrendExhausted,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopHit => "stop",
            ExitReason::TrendExhausted => "adx_exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseEvent {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    pub position: Option<Position>,
    pub opened: bool,
    /// New stop price when the trailing stop moved this step.
    pub stop_moved: Option<f64>,
    pub closed: Option<CloseEvent>,
    /// Why a directional signal did not produce an entry.
    pub rejected: Option<String>,
}

pub fn step(current: Option<Position>, input: &StepInput, params: &PositionParams) -> StepOutcome {
    match current {
        Some(position) => step_open(position, input, params),
        None => step_flat(input, params),
    }
}

fn step_open(mut position: Position, input: &StepInput, params: &PositionParams) -> StepOutcome {
    let mut outcome = StepOutcome::default();

    if let Some(atr) = input.atr {
        let candidate = Position::stop_for(position.direction, input.price, params.atr_multiplier * atr);
        if let Some(stop) = position.tightened_stop(candidate) {
            position.stop_loss_price = stop;
            outcome.stop_moved = Some(stop);
        }
    }

    if position.stop_crossed(input.price) {
        let exit_price = position.stop_loss_price;
        outcome.closed = Some(CloseEvent {
            position,
            exit_price,
            exit_time: input.timestamp,
            reason: ExitReason::StopHit,
        });
        return outcome;
    }

    if input.signal.is_some_and(|s| s.exit) {
        outcome.closed = Some(CloseEvent {
            position,
            exit_price: input.price,
            exit_time: input.timestamp,
            reason: ExitReason::TrendExhausted,
        });
        return outcome;
    }

    outcome.position = Some(position);
    outcome
}

fn step_flat(input: &StepInput, params: &PositionParams) -> StepOutcome {
    let mut outcome = StepOutcome::default();

    let Some(direction) = input.signal.and_then(|s| s.signal.direction()) else {
        return outcome;
    };
    let Some(atr) = input.atr else {
        outcome.rejected = Some("ATR undefined at entry".to_string());
        return outcome;
    };

    let stop = Position::stop_for(direction, input.price, params.atr_multiplier * atr);
    match calculate_units(input.account_balance, params.risk_fraction, input.price, stop) {
        Ok(units) if units > 0 => {
            outcome.position = Some(Position {
                instrument: input.instrument.clone(),
                direction,
                entry_price: input.price,
                stop_loss_price: stop,
                units,
                entry_time: input.timestamp,
            });
            outcome.opened = true;
        }
        Ok(_) => outcome.rejected = Some("sized to zero units".to_string()),
        Err(e) => outcome.rejected = Some(e.to_string()),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Signal;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn params() -> PositionParams {
        PositionParams {
            atr_multiplier: 2.0,
            risk_fraction: 0.03,
        }
    }

    fn input(minute: i64, price: f64, atr: Option<f64>, signal: Option<SignalOutput>) -> StepInput {
        StepInput {
            instrument: "EUR_USD".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            price,
            atr,
            signal,
            account_balance: 10_000.0,
        }
    }

    fn sig(signal: Signal, exit: bool) -> Option<SignalOutput> {
        Some(SignalOutput { signal, exit })
    }

    fn long_at(entry: f64, stop: f64) -> Position {
        Position {
            instrument: "EUR_USD".into(),
            direction: Direction::Long,
            entry_price: entry,
            stop_loss_price: stop,
            units: 100,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn short_at(entry: f64, stop: f64) -> Position {
        Position {
            direction: Direction::Short,
            ..long_at(entry, stop)
        }
    }

    #[test]
    fn flat_with_short_signal_opens_short() {
        let out = step(None, &input(0, 174.0, Some(1.5), sig(Signal::Short, false)), &params());
        let pos = out.position.unwrap();
        assert!(out.opened);
        assert!(pos.is_short());
        assert_eq!(pos.entry_price, 174.0);
        assert_eq!(pos.stop_loss_price, 177.0);
        assert_eq!(pos.units, 100);
        assert_eq!(pos.signed_units(), -100);
    }

    #[test]
    fn flat_with_long_signal_sets_stop_below() {
        let out = step(None, &input(0, 1.1050, Some(0.0025), sig(Signal::Long, false)), &params());
        let pos = out.position.unwrap();
        assert!(pos.is_long());
        assert!((pos.stop_loss_price - 1.1000).abs() < 1e-12);
        assert_eq!(pos.units, 60_000);
    }

    #[test]
    fn flat_without_signal_stays_flat() {
        let out = step(None, &input(0, 1.0, Some(0.1), sig(Signal::Flat, false)), &params());
        assert_eq!(out, StepOutcome::default());
        let out = step(None, &input(0, 1.0, Some(0.1), None), &params());
        assert_eq!(out, StepOutcome::default());
    }

    #[test]
    fn zero_atr_entry_is_rejected() {
        let out = step(None, &input(0, 1.0, Some(0.0), sig(Signal::Long, false)), &params());
        assert!(out.position.is_none());
        assert!(!out.opened);
        assert!(out.rejected.unwrap().contains("stop distance"));
    }

    #[test]
    fn long_stop_only_rises() {
        let pos = long_at(100.0, 96.0);
        let out = step(Some(pos), &input(1, 103.0, Some(1.0), sig(Signal::Flat, false)), &params());
        assert_eq!(out.stop_moved, Some(101.0));
        assert_eq!(out.position.as_ref().unwrap().stop_loss_price, 101.0);

        let out = step(out.position, &input(2, 102.0, Some(1.0), sig(Signal::Flat, false)), &params());
        assert_eq!(out.stop_moved, None);
        assert_eq!(out.position.unwrap().stop_loss_price, 101.0);
    }

    #[test]
    fn short_stop_only_falls() {
        let pos = short_at(174.0, 177.0);
        let out = step(Some(pos), &input(1, 173.0, Some(1.5), sig(Signal::Short, false)), &params());
        assert_eq!(out.stop_moved, Some(176.0));

        let out = step(out.position, &input(2, 175.0, Some(1.5), sig(Signal::Short, false)), &params());
        assert_eq!(out.stop_moved, None);
        assert_eq!(out.position.unwrap().stop_loss_price, 176.0);
    }

    #[test]
    fn long_breach_closes_at_stop_price() {
        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 97.5, Some(1.0), sig(Signal::Long, false)), &params());
        let close = out.closed.unwrap();
        assert_eq!(close.exit_price, 98.0);
        assert_eq!(close.reason, ExitReason::StopHit);
        assert!(out.position.is_none());
        assert!(!out.opened);
    }

    #[test]
    fn touching_stop_does_not_close() {
        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 98.0, Some(5.0), sig(Signal::Flat, false)), &params());
        assert!(out.closed.is_none());
        assert!(out.position.is_some());
    }

    #[test]
    fn short_breach_after_ratchet_closes_at_new_stop() {
        let pos = short_at(174.0, 156.0);
        // candidate 171 + 3 = 174 is looser, stop stays 156; 171 > 156 breaches
        let out = step(Some(pos), &input(1, 171.0, Some(1.5), sig(Signal::Short, false)), &params());
        let close = out.closed.unwrap();
        assert_eq!(close.exit_price, 156.0);
        assert_eq!(close.position.direction, Direction::Short);
    }

    #[test]
    fn exit_flag_closes_at_market() {
        let pos = short_at(174.0, 177.0);
        let out = step(Some(pos), &input(1, 175.0, Some(1.5), sig(Signal::Flat, true)), &params());
        let close = out.closed.unwrap();
        assert_eq!(close.exit_price, 175.0);
        assert_eq!(close.reason, ExitReason::TrendExhausted);
        assert!(out.position.is_none());
    }

    #[test]
    fn opposite_signal_never_flips_in_one_step() {
        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 99.0, Some(1.0), sig(Signal::Short, true)), &params());
        assert!(out.closed.is_some());
        assert!(out.position.is_none());
        assert!(!out.opened);

        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 99.0, Some(1.0), sig(Signal::Short, false)), &params());
        assert!(out.closed.is_none());
        assert!(out.position.unwrap().is_long());
    }

    #[test]
    fn missing_atr_still_checks_breach() {
        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 97.0, None, None), &params());
        assert_eq!(out.closed.unwrap().exit_price, 98.0);

        let pos = long_at(100.0, 98.0);
        let out = step(Some(pos), &input(1, 105.0, None, None), &params());
        assert_eq!(out.stop_moved, None);
        assert!(out.position.is_some());
    }

    #[test]
    fn pnl_helpers() {
        let pos = short_at(174.0, 177.0);
        assert_eq!(pos.profit_per_unit(154.0), 20.0);
        assert_eq!(pos.unrealized_pnl(170.0), 400.0);
        assert!(pos.stop_crossed(177.5));
        assert!(!pos.stop_crossed(177.0));
    }

    proptest! {
        #[test]
        fn trailing_stop_is_monotone(
            prices in prop::collection::vec(50.0f64..150.0, 1..60),
            atr in 0.1f64..5.0,
            long in any::<bool>(),
        ) {
            let direction = if long { Direction::Long } else { Direction::Short };
            let mut position = Some(Position {
                instrument: "EUR_USD".into(),
                direction,
                entry_price: 100.0,
                stop_loss_price: Position::stop_for(direction, 100.0, 2.0 * atr),
                units: 10,
                entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            });
            let mut last_stop = position.as_ref().unwrap().stop_loss_price;

            for (i, price) in prices.iter().enumerate() {
                let out = step(position, &input(i as i64 + 1, *price, Some(atr), None), &params());
                prop_assert!(!out.opened);
                match (&out.position, &out.closed) {
                    (Some(p), None) => {
                        match direction {
                            Direction::Long => prop_assert!(p.stop_loss_price >= last_stop),
                            Direction::Short => prop_assert!(p.stop_loss_price <= last_stop),
                        }
                        last_stop = p.stop_loss_price;
                    }
                    (None, Some(close)) => {
                        prop_assert_eq!(close.exit_price, close.position.stop_loss_price);
                        break;
                    }
                    _ => prop_assert!(false, "position and close event must be exclusive"),
                }
                position = out.position;
            }
        }
    }
}
