//! Strategy parameters shared by the backtest and the live trader.

use crate::domain::bar::Granularity;
use crate::domain::indicator_helpers::IndicatorParams;
use crate::domain::position::PositionParams;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub instrument: String,
    /// Negatively correlated index the divergence is measured against.
    pub reference: String,
    pub granularity: Granularity,
    pub adx_threshold: f64,
    pub adx_period: usize,
    pub atr_period: usize,
    pub sma_period: usize,
    pub volume_period: usize,
    pub trailing_stop_atr_multiplier: f64,
    pub risk_fraction: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            instrument: "EUR_USD".into(),
            reference: "USD_IDX".into(),
            granularity: Granularity::M15,
            adx_threshold: 25.0,
            adx_period: 14,
            atr_period: 14,
            sma_period: 20,
            volume_period: 20,
            trailing_stop_atr_multiplier: 2.0,
            risk_fraction: 0.03,
        }
    }
}

impl StrategyConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            sma_period: self.sma_period,
            volume_period: self.volume_period,
            atr_period: self.atr_period,
            adx_period: self.adx_period,
        }
    }

    pub fn position_params(&self) -> PositionParams {
        PositionParams {
            atr_multiplier: self.trailing_stop_atr_multiplier,
            risk_fraction: self.risk_fraction,
        }
    }

    pub fn warmup_bars(&self) -> usize {
        self.indicator_params().warmup_bars()
    }
}
