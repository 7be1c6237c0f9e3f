//! Brokerage port trait.
//!
//! Units are signed: positive buys, negative sells.

use crate::domain::error::PairtraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub trade_id: String,
    pub price: f64,
}

/// An open trade as the broker reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerTrade {
    pub id: String,
    pub units: i64,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
}

pub trait BrokerPort {
    fn get_balance(&self) -> Result<f64, PairtraderError>;

    /// Market order with an attached stop-loss.
    fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
    ) -> Result<OrderFill, PairtraderError>;

    fn modify_stop(&self, trade_id: &str, stop_loss: f64) -> Result<(), PairtraderError>;

    /// Close at market; returns the exit price.
    fn close_position(&self, trade_id: &str) -> Result<f64, PairtraderError>;

    fn get_open_positions(&self, instrument: &str) -> Result<Vec<BrokerTrade>, PairtraderError>;
}
