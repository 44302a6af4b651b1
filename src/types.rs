// =============================================================================
// Shared types used across the kline-watch engine
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Kline intervals accepted by the Binance spot API. Case-sensitive: `1m` is
/// one minute, `1M` is one month.
pub const SUPPORTED_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d",
    "1w", "1M",
];

/// Identifies the (symbol, interval) pair a session is observing.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey {
    pub symbol: String,
    pub interval: String,
}

impl SessionKey {
    /// Normalize and validate a user-supplied pair.
    ///
    /// The symbol is trimmed and uppercased; the interval is trimmed and must
    /// be one of [`SUPPORTED_INTERVALS`].
    pub fn new(symbol: &str, interval: &str) -> Result<Self, StreamError> {
        let symbol = symbol.trim().to_uppercase();
        let interval = interval.trim();

        if symbol.is_empty() {
            return Err(StreamError::InvalidSessionKey("symbol is empty".into()));
        }
        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StreamError::InvalidSessionKey(format!(
                "symbol {symbol} contains non-alphanumeric characters"
            )));
        }
        if interval.is_empty() {
            return Err(StreamError::InvalidSessionKey("interval is empty".into()));
        }
        if !SUPPORTED_INTERVALS.contains(&interval) {
            return Err(StreamError::InvalidSessionKey(format!(
                "unsupported interval {interval}"
            )));
        }

        Ok(Self {
            symbol,
            interval: interval.to_string(),
        })
    }

    /// Stream name used by the live feed, e.g. `btcusdt@kline_1m`.
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.symbol.to_lowercase(), self.interval)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

/// Trend classification derived from the last close and the two SMAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Sideways,
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "Up"),
            Self::Down => write!(f, "Down"),
            Self::Sideways => write!(f, "Sideways"),
            Self::InsufficientData => write!(f, "InsufficientData"),
        }
    }
}

/// Overbought / oversold classification of the latest RSI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiState {
    Overbought,
    Oversold,
    Neutral,
    InsufficientData,
}

impl std::fmt::Display for RsiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overbought => write!(f, "Overbought"),
            Self::Oversold => write!(f, "Oversold"),
            Self::Neutral => write!(f, "Neutral"),
            Self::InsufficientData => write!(f, "InsufficientData"),
        }
    }
}

/// Lifecycle of a viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Loading,
    Live,
    Switching,
    Closed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Live => write!(f, "Live"),
            Self::Switching => write!(f, "Switching"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
