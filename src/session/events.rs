// =============================================================================
// Render frames and status events
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StreamError;
use crate::indicators::IndicatorSnapshot;
use crate::market_data::Candle;
use crate::types::SessionKey;

/// Immutable view of the session handed to the renderer after every
/// recompute. The renderer owns its copy and never touches the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub key: SessionKey,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSnapshot,
    pub latest_close: Option<f64>,
    pub latest_high: Option<f64>,
    pub latest_low: Option<f64>,
    /// Close timestamp (ms) of the newest update.
    pub latest_event_time: Option<i64>,
}

/// Status transitions and notices reported to the observability sink.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Loading { key: SessionKey },
    Live { key: SessionKey },
    Error { key: Option<SessionKey>, error: StreamError },
    Closed { key: SessionKey, reason: String },
    TickDropped { key: SessionKey, error: StreamError },
}

/// Short machine-readable status name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Loading,
    Live,
    Error,
    Closed,
    TickDropped,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Live => write!(f, "live"),
            Self::Error => write!(f, "error"),
            Self::Closed => write!(f, "closed"),
            Self::TickDropped => write!(f, "tick_dropped"),
        }
    }
}

impl StatusEvent {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Loading { .. } => StatusKind::Loading,
            Self::Live { .. } => StatusKind::Live,
            Self::Error { .. } => StatusKind::Error,
            Self::Closed { .. } => StatusKind::Closed,
            Self::TickDropped { .. } => StatusKind::TickDropped,
        }
    }

    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            Self::Loading { key }
            | Self::Live { key }
            | Self::Closed { key, .. }
            | Self::TickDropped { key, .. } => Some(key),
            Self::Error { key, .. } => key.as_ref(),
        }
    }

    /// Human-readable detail line.
    pub fn message(&self) -> String {
        match self {
            Self::Loading { key } => format!("loading history for {key}"),
            Self::Live { key } => format!("live feed connected for {key}"),
            Self::Error { error, .. } => error.to_string(),
            Self::Closed { reason, .. } => reason.clone(),
            Self::TickDropped { error, .. } => error.to_string(),
        }
    }
}

/// Receives a frame on every recompute. Purely presentational.
pub trait Renderer: Send + Sync {
    fn render(&self, frame: &RenderFrame);
}

/// Receives status transitions and dropped-tick notices.
pub trait StatusSink: Send + Sync {
    fn report(&self, event: &StatusEvent);
}

/// Log a status event with `tracing` at a level matching its severity.
pub fn log_status(event: &StatusEvent) {
    let key = event
        .key()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    match event.kind() {
        StatusKind::Loading | StatusKind::Live | StatusKind::Closed => {
            info!(key = %key, status = %event.kind(), detail = %event.message(), "session status");
        }
        StatusKind::Error | StatusKind::TickDropped => {
            warn!(key = %key, status = %event.kind(), detail = %event.message(), "session status");
        }
    }
}

/// Status sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, event: &StatusEvent) {
        log_status(event);
    }
}
