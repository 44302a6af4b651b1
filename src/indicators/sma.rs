// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Arithmetic mean of the trailing `period` closes, computed with a running
// sum: add the incoming close, subtract the close leaving the window. One
// pass, O(N) regardless of the period.
// =============================================================================

/// Compute the SMA series aligned with `closes`.
///
/// Position `i` is `None` for `i < period - 1` and the mean of
/// `closes[i + 1 - period ..= i]` afterwards.
///
/// # Edge cases
/// - `period == 0` => every position is `None`
/// - `closes.len() < period` => every position is `None`
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 {
        return out;
    }

    let period_f = period as f64;
    let mut sum = 0.0_f64;
    for (i, &close) in closes.iter().enumerate() {
        sum += close;
        if i >= period {
            sum -= closes[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / period_f);
        }
    }
    out
}
