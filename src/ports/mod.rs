//! Port traits the engine drives; adapters implement them.

pub mod broker_port;
pub mod config_port;
pub mod ledger_port;
pub mod market_data_port;
