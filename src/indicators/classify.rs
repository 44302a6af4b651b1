// =============================================================================
// Indicator classification labels
// =============================================================================

use crate::types::{RsiState, Trend};

/// RSI at or above this value is overbought.
pub const OVERBOUGHT: f64 = 70.0;
/// RSI at or below this value is oversold.
pub const OVERSOLD: f64 = 30.0;

/// Classify the trend from the latest close and the fast / slow SMA.
///
/// Both comparisons are strict, so any equality falls through to
/// [`Trend::Sideways`].
pub fn trend_label(close: f64, sma_fast: Option<f64>, sma_slow: Option<f64>) -> Trend {
    let (Some(fast), Some(slow)) = (sma_fast, sma_slow) else {
        return Trend::InsufficientData;
    };

    if fast > slow && close > fast {
        Trend::Up
    } else if fast < slow && close < fast {
        Trend::Down
    } else {
        Trend::Sideways
    }
}

/// Classify the latest RSI value. Both boundaries are inclusive.
pub fn rsi_state(rsi: Option<f64>) -> RsiState {
    match rsi {
        None => RsiState::InsufficientData,
        Some(v) if v >= OVERBOUGHT => RsiState::Overbought,
        Some(v) if v <= OVERSOLD => RsiState::Oversold,
        Some(_) => RsiState::Neutral,
    }
}
