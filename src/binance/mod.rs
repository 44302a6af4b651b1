// =============================================================================
// Binance Module — public kline history over REST, live klines over WebSocket
// =============================================================================

pub mod client;
pub mod kline_stream;
pub mod rate_limit;

pub use client::BinanceRestClient;
pub use kline_stream::BinanceKlineFeed;
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
