// =============================================================================
// Error taxonomy for the candle stream core
// =============================================================================
//
// Buffer- and indicator-level errors never escape the session controller;
// they are turned into status events there. Transport code works in
// `anyhow::Result` and converts at the collaborator trait boundary.
// =============================================================================

use thiserror::Error;

/// Errors produced by the candle buffer, the session controller and the
/// snapshot / live-feed collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The historical snapshot request failed (transport or HTTP status).
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// A live tick arrived with an open time earlier than the newest candle.
    #[error("out-of-order candle: open_time {incoming} precedes last open_time {last}")]
    OutOfOrderCandle {
        /// Open time of the rejected candle.
        incoming: i64,
        /// Open time of the newest candle in the buffer.
        last: i64,
    },

    /// The live feed reported closure or a transport error.
    #[error("feed disconnected: {0}")]
    FeedDisconnected(String),

    /// A live-feed payload could not be parsed into a candle.
    #[error("malformed tick: {0}")]
    MalformedTick(String),

    /// Symbol or interval failed normalization.
    #[error("invalid session key: {0}")]
    InvalidSessionKey(String),

    /// Configuration values are out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
