// =============================================================================
// kline-watch — live candlestick viewer core
// =============================================================================
//
// A bounded candle buffer seeded from a historical snapshot and kept current
// from a live kline stream, an indicator engine recomputed after every
// change, and a session controller that guarantees a single live
// subscription across symbol / interval switches.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod binance;
pub mod config;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod session;
pub mod types;

pub use error::StreamError;
