// =============================================================================
// Test doubles for the session collaborators
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::events::{RenderFrame, Renderer, StatusEvent, StatusKind, StatusSink};
use super::feed::{FeedEvent, FeedHandle, FeedSink, HistoricalSnapshotSource, LiveFeedSource};
use crate::error::StreamError;
use crate::market_data::Candle;
use crate::types::SessionKey;

pub const MINUTE: i64 = 60_000;

/// `count` one-minute candles starting at `start_open`, closes rising by 1.
pub fn synthetic_candles(start_open: i64, count: usize, base: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let open_time = start_open + i as i64 * MINUTE;
            let close = base + i as f64;
            Candle::new(open_time, close - 0.5, close + 1.0, close - 1.0, close, open_time + MINUTE - 1)
        })
        .collect()
}

/// Single-stream kline payload for a one-minute candle.
pub fn kline_json(open_time: i64, close: f64) -> String {
    format!(
        r#"{{"e":"kline","s":"BTCUSDT","k":{{"t":{open_time},"T":{close_time},"i":"1m","o":"{open}","h":"{high}","l":"{low}","c":"{close}","x":false}}}}"#,
        close_time = open_time + MINUTE - 1,
        open = close,
        high = close + 1.0,
        low = close - 1.0,
    )
}

// ---------------------------------------------------------------------------
// Snapshot source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedSnapshotSource {
    responses: Mutex<VecDeque<Result<Vec<Candle>, StreamError>>>,
    limits: Mutex<Vec<usize>>,
    open_probe: Mutex<Option<Arc<AtomicUsize>>>,
    open_at_fetch: Mutex<Vec<usize>>,
}

impl ScriptedSnapshotSource {
    pub fn push_ok(&self, candles: Vec<Candle>) {
        self.responses.lock().push_back(Ok(candles));
    }

    pub fn push_err(&self, error: StreamError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Record the number of open feeds every time a fetch starts.
    pub fn attach_feed_probe(&self, open: Arc<AtomicUsize>) {
        *self.open_probe.lock() = Some(open);
    }

    pub fn requested_limits(&self) -> Vec<usize> {
        self.limits.lock().clone()
    }

    pub fn open_feeds_at_fetch(&self) -> Vec<usize> {
        self.open_at_fetch.lock().clone()
    }
}

#[async_trait]
impl HistoricalSnapshotSource for ScriptedSnapshotSource {
    async fn fetch(&self, _key: &SessionKey, limit: usize) -> Result<Vec<Candle>, StreamError> {
        self.limits.lock().push(limit);
        if let Some(open) = self.open_probe.lock().as_ref() {
            self.open_at_fetch.lock().push(open.load(Ordering::SeqCst));
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StreamError::SnapshotUnavailable("no scripted response".into())))
    }
}

// ---------------------------------------------------------------------------
// Live feed source
// ---------------------------------------------------------------------------

/// Counts open subscriptions; a handle that is dropped without `close`
/// stays counted as open.
#[derive(Default)]
pub struct FakeFeedSource {
    open: Arc<AtomicUsize>,
    max_concurrent: AtomicUsize,
    subscribes: AtomicUsize,
    fail_next: AtomicBool,
    closed_codes: Arc<Mutex<Vec<u16>>>,
    sinks: Mutex<Vec<FeedSink>>,
}

impl FakeFeedSource {
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.open.clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn closed_codes(&self) -> Vec<u16> {
        self.closed_codes.lock().clone()
    }

    pub fn fail_next_subscribe(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Sink of the most recent subscription, for pushing events by hand.
    pub fn last_sink(&self) -> Option<FeedSink> {
        self.sinks.lock().last().cloned()
    }
}

struct FakeHandle {
    open: Arc<AtomicUsize>,
    closed_codes: Arc<Mutex<Vec<u16>>>,
    closed: bool,
}

#[async_trait]
impl FeedHandle for FakeHandle {
    async fn close(&mut self, code: u16) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.closed_codes.lock().push(code);
    }
}

#[async_trait]
impl LiveFeedSource for FakeFeedSource {
    async fn subscribe(
        &self,
        _key: &SessionKey,
        sink: FeedSink,
    ) -> Result<Box<dyn FeedHandle>, StreamError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StreamError::FeedDisconnected("connection refused".into()));
        }

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now_open, Ordering::SeqCst);
        sink.send(FeedEvent::Opened);
        self.sinks.lock().push(sink);

        Ok(Box::new(FakeHandle {
            open: self.open.clone(),
            closed_codes: self.closed_codes.clone(),
            closed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Renderer / status sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingRenderer {
    frames: Mutex<Vec<RenderFrame>>,
}

impl RecordingRenderer {
    pub fn frames(&self) -> Vec<RenderFrame> {
        self.frames.lock().clone()
    }

    pub fn last(&self) -> Option<RenderFrame> {
        self.frames.lock().last().cloned()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, frame: &RenderFrame) {
        self.frames.lock().push(frame.clone());
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingStatus {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<StatusKind> {
        self.events.lock().iter().map(StatusEvent::kind).collect()
    }

    pub fn last_kind(&self) -> Option<StatusKind> {
        self.events.lock().last().map(StatusEvent::kind)
    }

    pub fn count(&self, kind: StatusKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

impl StatusSink for RecordingStatus {
    fn report(&self, event: &StatusEvent) {
        self.events.lock().push(event.clone());
    }
}
