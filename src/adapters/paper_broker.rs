//! In-memory simulated broker.
//!
//! Fills every market order at the latest market-data price and keeps the
//! account balance in step with realized PnL. Stops are recorded but only
//! enforced when the caller closes the trade.

use std::cell::RefCell;

use crate::domain::error::PairtraderError;
use crate::ports::broker_port::{BrokerPort, BrokerTrade, OrderFill};
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone)]
struct PaperTrade {
    id: String,
    instrument: String,
    units: i64,
    entry_price: f64,
    stop_loss: f64,
}

#[derive(Debug)]
struct PaperAccount {
    balance: f64,
    next_id: u64,
    open: Vec<PaperTrade>,
}

pub struct PaperBroker<'a> {
    market: &'a dyn MarketDataPort,
    account: RefCell<PaperAccount>,
}

impl<'a> PaperBroker<'a> {
    pub fn new(market: &'a dyn MarketDataPort, balance: f64) -> Self {
        Self {
            market,
            account: RefCell::new(PaperAccount {
                balance,
                next_id: 1,
                open: Vec::new(),
            }),
        }
    }
}

impl BrokerPort for PaperBroker<'_> {
    fn get_balance(&self) -> Result<f64, PairtraderError> {
        Ok(self.account.borrow().balance)
    }

    fn place_market_order(
        &self,
        instrument: &str,
        units: i64,
        stop_loss: f64,
    ) -> Result<OrderFill, PairtraderError> {
        if units == 0 {
            return Err(PairtraderError::InvalidRiskInput {
                reason: "order for zero units".to_string(),
            });
        }
        let price = self.market.get_latest_price(instrument)?;
        let mut account = self.account.borrow_mut();
        let id = account.next_id.to_string();
        account.next_id += 1;
        account.open.push(PaperTrade {
            id: id.clone(),
            instrument: instrument.to_string(),
            units,
            entry_price: price,
            stop_loss,
        });
        Ok(OrderFill {
            trade_id: id,
            price,
        })
    }

    fn modify_stop(&self, trade_id: &str, stop_loss: f64) -> Result<(), PairtraderError> {
        let mut account = self.account.borrow_mut();
        let trade = account
            .open
            .iter_mut()
            .find(|t| t.id == trade_id)
            .ok_or_else(|| {
                PairtraderError::unavailable("broker", format!("no open trade {}", trade_id))
            })?;
        trade.stop_loss = stop_loss;
        Ok(())
    }

    fn close_position(&self, trade_id: &str) -> Result<f64, PairtraderError> {
        let instrument = {
            let account = self.account.borrow();
            account
                .open
                .iter()
                .find(|t| t.id == trade_id)
                .map(|t| t.instrument.clone())
                .ok_or_else(|| {
                    PairtraderError::unavailable("broker", format!("no open trade {}", trade_id))
                })?
        };
        let price = self.market.get_latest_price(&instrument)?;

        let mut account = self.account.borrow_mut();
        if let Some(pos) = account.open.iter().position(|t| t.id == trade_id) {
            let trade = account.open.remove(pos);
            account.balance += trade.units as f64 * (price - trade.entry_price);
        }
        Ok(price)
    }

    fn get_open_positions(&self, instrument: &str) -> Result<Vec<BrokerTrade>, PairtraderError> {
        Ok(self
            .account
            .borrow()
            .open
            .iter()
            .filter(|t| t.instrument == instrument)
            .map(|t| BrokerTrade {
                id: t.id.clone(),
                units: t.units,
                entry_price: t.entry_price,
                stop_price: Some(t.stop_loss),
            })
            .collect())
    }
}
