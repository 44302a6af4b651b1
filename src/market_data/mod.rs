pub mod candle_buffer;
pub mod kline;

// Re-export for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle_buffer::{Candle, CandleBuffer, UpsertOutcome};
pub use kline::{parse_kline_event, KlineUpdate};
