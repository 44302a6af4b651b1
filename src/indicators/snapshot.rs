// =============================================================================
// Indicator snapshot — full recompute from the buffer's closes
// =============================================================================
//
// Nothing here carries state between ticks. Every snapshot is derived from
// scratch from the closes it is given, so it always matches the buffer, even
// after eviction or an in-place replacement of the newest candle.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::classify::{rsi_state, trend_label};
use super::rsi::calculate_rsi;
use super::sma::calculate_sma;
use crate::config::StreamConfig;
use crate::types::{RsiState, Trend};

/// Look-back periods used for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorParams {
    /// SMA periods; the first two are the fast and slow averages.
    pub sma_periods: Vec<usize>,
    pub rsi_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_periods: vec![20, 60],
            rsi_period: 14,
        }
    }
}

impl From<&StreamConfig> for IndicatorParams {
    fn from(cfg: &StreamConfig) -> Self {
        Self {
            sma_periods: cfg.sma_periods.clone(),
            rsi_period: cfg.rsi_period,
        }
    }
}

/// One SMA overlay line aligned with the buffer's candles. Values are
/// rounded to two decimals for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmaLine {
    pub period: usize,
    pub points: Vec<Option<f64>>,
}

/// Latest indicator values and labels for the current buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Last value of the fast SMA (default period 20).
    pub sma_fast: Option<f64>,
    /// Last value of the slow SMA (default period 60).
    pub sma_slow: Option<f64>,
    /// Last RSI value (default period 14).
    pub rsi: Option<f64>,
    pub trend: Trend,
    pub rsi_state: RsiState,
    pub sma_lines: Vec<SmaLine>,
}

impl IndicatorSnapshot {
    /// Snapshot of an empty buffer.
    pub fn empty() -> Self {
        Self {
            sma_fast: None,
            sma_slow: None,
            rsi: None,
            trend: Trend::InsufficientData,
            rsi_state: RsiState::InsufficientData,
            sma_lines: Vec::new(),
        }
    }

    /// Compute every indicator from `closes` (oldest first).
    pub fn compute(closes: &[f64], params: &IndicatorParams) -> Self {
        let Some(&last_close) = closes.last() else {
            return Self::empty();
        };

        let series: Vec<(usize, Vec<Option<f64>>)> = params
            .sma_periods
            .iter()
            .map(|&period| (period, calculate_sma(closes, period)))
            .collect();

        let last_of = |idx: usize| -> Option<f64> {
            series
                .get(idx)
                .and_then(|(_, values)| values.last().copied().flatten())
        };
        let sma_fast = last_of(0);
        let sma_slow = last_of(1);

        let rsi = calculate_rsi(closes, params.rsi_period)
            .last()
            .copied()
            .flatten();

        let sma_lines = series
            .into_iter()
            .map(|(period, values)| SmaLine {
                period,
                points: values.into_iter().map(|v| v.map(round2)).collect(),
            })
            .collect();

        Self {
            sma_fast,
            sma_slow,
            rsi,
            trend: trend_label(last_close, sma_fast, sma_slow),
            rsi_state: rsi_state(rsi),
            sma_lines,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
