//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod ledger;
pub mod live;
pub mod metrics;
pub mod pair_data;
pub mod position;
pub mod signal;
pub mod sizing;
pub mod strategy;
