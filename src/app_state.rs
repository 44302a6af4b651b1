// =============================================================================
// Shared View State — what the HTTP / WebSocket surface serves
// =============================================================================
//
// The session driver owns the buffer; this struct only ever sees immutable
// copies of what it produced. `AppState` is the renderer and the status sink
// handed to the `SessionController`, and it is the command outlet for the
// REST switch endpoint.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for the latest frame, status and error log.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::binance::{RateLimitSnapshot, RateLimitTracker};
use crate::session::{
    log_status, RenderFrame, Renderer, SessionCommand, StatusEvent, StatusKind, StatusSink,
};
use crate::types::SessionKey;

// =============================================================================
// Records
// =============================================================================

/// A recorded error or dropped tick for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<SessionKey>,
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Latest session status as shown to viewers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub kind: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<SessionKey>,
    pub message: String,
    pub at: String,
}

impl From<&StatusEvent> for StatusView {
    fn from(event: &StatusEvent) -> Self {
        Self {
            kind: event.kind(),
            key: event.key().cloned(),
            message: event.message(),
            at: Utc::now().to_rfc3339(),
        }
    }
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Shared across the session driver and every HTTP task via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every new frame or status. The WebSocket feed pushes
    /// whenever it differs from what a client last saw.
    pub state_version: AtomicU64,

    /// Number of WebSocket viewers currently connected.
    pub ws_clients: AtomicU64,

    frame: RwLock<Option<RenderFrame>>,
    status: RwLock<Option<StatusView>>,
    dropped_ticks: AtomicU64,
    recent_errors: RwLock<Vec<ErrorRecord>>,

    commands: mpsc::Sender<SessionCommand>,
    rate_limit: Arc<RateLimitTracker>,

    /// Instant when the process was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(commands: mpsc::Sender<SessionCommand>, rate_limit: Arc<RateLimitTracker>) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            ws_clients: AtomicU64::new(0),
            frame: RwLock::new(None),
            status: RwLock::new(None),
            dropped_ticks: AtomicU64::new(0),
            recent_errors: RwLock::new(Vec::new()),
            commands,
            rate_limit,
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn latest_frame(&self) -> Option<RenderFrame> {
        self.frame.read().clone()
    }

    pub fn latest_status(&self) -> Option<StatusView> {
        self.status.read().clone()
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks.load(Ordering::Relaxed)
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.recent_errors.read().clone()
    }

    pub fn rate_limit(&self) -> RateLimitSnapshot {
        self.rate_limit.snapshot()
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Forward a command to the session driver. Returns `false` once the
    /// driver has stopped.
    pub async fn send_command(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    // ── Error Logging ───────────────────────────────────────────────────

    fn push_error(&self, event: &StatusEvent) {
        let record = ErrorRecord {
            kind: event.kind(),
            key: event.key().cloned(),
            message: event.message(),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Everything a viewer needs in one payload. Served by
    /// `GET /api/v1/status` (without the frame) and pushed over the
    /// WebSocket (with it).
    pub fn build_snapshot(&self, include_frame: bool) -> ViewSnapshot {
        ViewSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_s: self.start_time.elapsed().as_secs(),
            status: self.latest_status(),
            dropped_ticks: self.dropped_ticks(),
            recent_errors: self.recent_errors(),
            frame: if include_frame { self.latest_frame() } else { None },
        }
    }
}

impl Renderer for AppState {
    fn render(&self, frame: &RenderFrame) {
        *self.frame.write() = Some(frame.clone());
        self.increment_version();
    }
}

impl StatusSink for AppState {
    fn report(&self, event: &StatusEvent) {
        log_status(event);
        match event.kind() {
            // A dropped tick is a notice; the session stays in its state.
            StatusKind::TickDropped => {
                self.dropped_ticks.fetch_add(1, Ordering::Relaxed);
                self.push_error(event);
            }
            StatusKind::Error => {
                self.push_error(event);
                *self.status.write() = Some(StatusView::from(event));
            }
            StatusKind::Loading | StatusKind::Live | StatusKind::Closed => {
                *self.status.write() = Some(StatusView::from(event));
            }
        }
        self.increment_version();
    }
}

// =============================================================================
// Serialisable snapshot
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_s: u64,
    pub status: Option<StatusView>,
    pub dropped_ticks: u64,
    pub recent_errors: Vec<ErrorRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<RenderFrame>,
}
