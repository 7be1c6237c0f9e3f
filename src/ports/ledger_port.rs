//! Trade ledger persistence port trait.

use crate::domain::error::PairtraderError;
use crate::domain::ledger::{ExitFields, TradeEntry, TradeRecord};

pub trait LedgerPort {
    /// Stores a new open trade and returns its id.
    fn append_trade(&self, entry: &TradeEntry) -> Result<i64, PairtraderError>;

    /// Writes the exit fields of an open trade exactly once.
    fn update_trade(&self, id: i64, exit: &ExitFields) -> Result<(), PairtraderError>;

    /// All trades in insertion order.
    fn list_trades(&self) -> Result<Vec<TradeRecord>, PairtraderError>;
}
