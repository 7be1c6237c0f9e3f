//! Risk-budget position sizing.

use crate::domain::error::PairtraderError;

/// Unsigned units such that hitting the stop loses `balance * risk_fraction`.
///
/// `round(balance * risk_fraction / |entry - stop|)`. The caller applies the
/// sign for the trade direction.
pub fn calculate_units(
    balance: f64,
    risk_fraction: f64,
    entry_price: f64,
    stop_price: f64,
) -> Result<i64, PairtraderError> {
    if !balance.is_finite() || balance <= 0.0 {
        return Err(PairtraderError::InvalidRiskInput {
            reason: format!("balance must be positive, got {}", balance),
        });
    }
    if !(risk_fraction > 0.0 && risk_fraction <= 1.0) {
        return Err(PairtraderError::InvalidRiskInput {
            reason: format!("risk fraction must be in (0, 1], got {}", risk_fraction),
        });
    }
    let distance = (entry_price - stop_price).abs();
    if !distance.is_finite() || distance == 0.0 {
        return Err(PairtraderError::InvalidRiskInput {
            reason: format!(
                "stop distance must be non-zero and finite (entry {}, stop {})",
                entry_price, stop_price
            ),
        });
    }
    Ok((balance * risk_fraction / distance).round() as i64)
}
