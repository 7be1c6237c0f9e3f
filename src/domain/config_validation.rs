//! Configuration validation.
//!
//! Validates all config fields before a backtest or live run starts. Absent
//! or blank keys fall back to the strategy defaults and are not errors; a
//! present value that does not parse is.

use crate::domain::bar::Granularity;
use crate::domain::error::PairtraderError;
use crate::ports::config_port::ConfigPort;

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    validate_instruments(config)?;
    validate_granularity(config)?;
    for key in ["adx_period", "atr_period", "sma_period", "volume_period"] {
        validate_period(config, key)?;
    }
    validate_positive(config, "strategy", "adx_threshold", 25.0)?;
    validate_positive(config, "strategy", "trailing_stop_atr_multiplier", 2.0)?;
    validate_risk_fraction(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    validate_positive(config, "backtest", "initial_balance", 10_000.0)?;
    validate_at_least_one(config, "backtest", "bar_count", 500)
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    validate_positive(config, "live", "paper_balance", 10_000.0)?;
    validate_at_least_one(config, "live", "poll_interval_secs", 1)?;
    validate_at_least_one(config, "live", "regate_interval_secs", 1)
}

fn raw_value(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn int_value(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, PairtraderError> {
    match raw_value(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| PairtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be an integer, got '{}'", key, raw),
        }),
    }
}

fn float_value(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, PairtraderError> {
    match raw_value(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| PairtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be a number, got '{}'", key, raw),
        }),
    }
}

fn validate_instruments(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let instrument = config
        .get_string("strategy", "instrument")
        .unwrap_or_else(|| "EUR_USD".to_string());
    let reference = config
        .get_string("strategy", "reference")
        .unwrap_or_else(|| "USD_IDX".to_string());

    for (key, value) in [("instrument", &instrument), ("reference", &reference)] {
        if value.trim().is_empty() {
            return Err(PairtraderError::ConfigMissing {
                section: "strategy".to_string(),
                key: key.to_string(),
            });
        }
    }
    if instrument.trim() == reference.trim() {
        return Err(PairtraderError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "reference".to_string(),
            reason: "reference must differ from instrument".to_string(),
        });
    }
    Ok(())
}

fn validate_granularity(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    match config.get_string("strategy", "granularity") {
        None => Ok(()),
        Some(s) => s
            .parse::<Granularity>()
            .map(|_| ())
            .map_err(|reason| PairtraderError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "granularity".to_string(),
                reason,
            }),
    }
}

fn validate_period(config: &dyn ConfigPort, key: &str) -> Result<(), PairtraderError> {
    if int_value(config, "strategy", key, 14)? < 2 {
        return Err(PairtraderError::ConfigInvalid {
            section: "strategy".to_string(),
            key: key.to_string(),
            reason: format!("{} must be at least 2", key),
        });
    }
    Ok(())
}

fn validate_at_least_one(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), PairtraderError> {
    if int_value(config, section, key, default)? < 1 {
        return Err(PairtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be at least 1", key),
        });
    }
    Ok(())
}

fn validate_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), PairtraderError> {
    let value = float_value(config, section, key, default)?;
    if !(value > 0.0 && value.is_finite()) {
        return Err(PairtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be positive", key),
        });
    }
    Ok(())
}

fn validate_risk_fraction(config: &dyn ConfigPort) -> Result<(), PairtraderError> {
    let value = float_value(config, "strategy", "risk_fraction", 0.03)?;
    if !(value > 0.0 && value <= 1.0) {
        return Err(PairtraderError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "risk_fraction".to_string(),
            reason: "risk_fraction must be in (0, 1]".to_string(),
        });
    }
    Ok(())
}
