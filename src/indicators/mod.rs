// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over a closes slice (index 0 is
// the oldest close). Series outputs are aligned with their input and use
// `None` where there is not enough history yet.

pub mod classify;
pub mod rsi;
pub mod sma;
pub mod snapshot;

pub use classify::{rsi_state, trend_label};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use snapshot::{IndicatorParams, IndicatorSnapshot, SmaLine};
