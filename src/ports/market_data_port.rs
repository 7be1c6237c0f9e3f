//! Market data port trait.

use crate::domain::bar::{Bar, Granularity};
use crate::domain::error::PairtraderError;

pub trait MarketDataPort {
    /// The most recent `count` bars, oldest first.
    fn get_bars(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Bar>, PairtraderError>;

    fn get_latest_price(&self, instrument: &str) -> Result<f64, PairtraderError>;
}
