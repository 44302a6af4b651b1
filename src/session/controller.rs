// =============================================================================
// Session Controller — snapshot bootstrap, single live feed, recompute
// =============================================================================
//
// State machine:
//
//   Idle ──start──▶ Loading ──ok──▶ Live ──switch──▶ Switching ──▶ Loading ...
//                      │                 │
//                      └──fetch failed──▶ Idle / Closed ◀── feed closed
//
// The previous live feed is always closed (and its generation retired)
// before a new snapshot is requested, so at most one subscription exists at
// any time and a late tick from a superseded pair can never reach the new
// buffer. Indicators are recomputed from scratch after every mutation.
// =============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::events::{RenderFrame, Renderer, StatusEvent, StatusSink};
use super::feed::{
    FeedEvent, FeedHandle, FeedMessage, FeedSink, HistoricalSnapshotSource, LiveFeedSource,
    NORMAL_CLOSURE,
};
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::indicators::{IndicatorParams, IndicatorSnapshot};
use crate::market_data::{parse_kline_event, CandleBuffer, UpsertOutcome};
use crate::types::{SessionKey, SessionState};

/// The (symbol, interval) being observed, its buffer and its live feed.
pub struct Session {
    key: SessionKey,
    buffer: CandleBuffer,
    feed: Option<Box<dyn FeedHandle>>,
}

impl Session {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn buffer(&self) -> &CandleBuffer {
        &self.buffer
    }

    pub fn has_live_feed(&self) -> bool {
        self.feed.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("len", &self.buffer.len())
            .field("live_feed", &self.feed.is_some())
            .finish()
    }
}

/// Result of feeding one raw update through [`SessionController::on_tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The candle was merged and a frame rendered.
    Applied(UpsertOutcome),
    /// No session, or the payload carried no kline.
    Ignored,
    /// The tick was rejected; buffer and session state are unchanged.
    Dropped(StreamError),
}

/// Orchestrates one logical viewing session at a time.
pub struct SessionController {
    capacity: usize,
    snapshot_limit: usize,
    params: IndicatorParams,

    snapshot_source: Arc<dyn HistoricalSnapshotSource>,
    feed_source: Arc<dyn LiveFeedSource>,
    renderer: Arc<dyn Renderer>,
    status: Arc<dyn StatusSink>,

    state: SessionState,
    session: Option<Session>,
    indicators: IndicatorSnapshot,

    /// Generation of the only subscription whose events are accepted.
    generation: u64,
    feed_tx: mpsc::UnboundedSender<FeedMessage>,
    feed_rx: mpsc::UnboundedReceiver<FeedMessage>,
}

impl SessionController {
    pub fn new(
        config: &StreamConfig,
        snapshot_source: Arc<dyn HistoricalSnapshotSource>,
        feed_source: Arc<dyn LiveFeedSource>,
        renderer: Arc<dyn Renderer>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Self {
            capacity: config.capacity,
            snapshot_limit: config.snapshot_limit,
            params: IndicatorParams::from(config),
            snapshot_source,
            feed_source,
            renderer,
            status,
            state: SessionState::Idle,
            session: None,
            indicators: IndicatorSnapshot::empty(),
            generation: 0,
            feed_tx,
            feed_rx,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn key(&self) -> Option<&SessionKey> {
        self.session.as_ref().map(|s| &s.key)
    }

    pub fn indicators(&self) -> &IndicatorSnapshot {
        &self.indicators
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_live_feed(&self) -> bool {
        self.session.as_ref().is_some_and(Session::has_live_feed)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Start observing `key`: close any open feed, load the snapshot, seed a
    /// fresh buffer, render, then open exactly one live feed.
    ///
    /// On snapshot failure the previous buffer and frame are kept, no feed
    /// is opened, and the state falls back to `Closed` (a previous session
    /// exists) or `Idle`.
    pub async fn start(&mut self, key: SessionKey) -> SessionState {
        if self.state == SessionState::Live {
            self.state = SessionState::Switching;
        }
        self.close_feed().await;

        self.state = SessionState::Loading;
        self.report(StatusEvent::Loading { key: key.clone() });

        let candles = match self.snapshot_source.fetch(&key, self.snapshot_limit).await {
            Ok(candles) => candles,
            Err(e) => {
                let error = match e {
                    StreamError::SnapshotUnavailable(_) => e,
                    other => StreamError::SnapshotUnavailable(other.to_string()),
                };
                self.report(StatusEvent::Error {
                    key: Some(key),
                    error,
                });
                self.state = if self.session.is_some() {
                    SessionState::Closed
                } else {
                    SessionState::Idle
                };
                return self.state;
            }
        };

        let mut buffer = CandleBuffer::new(self.capacity);
        buffer.seed(&candles);
        info!(key = %key, candles = buffer.len(), "snapshot seeded");

        self.session = Some(Session {
            key: key.clone(),
            buffer,
            feed: None,
        });
        let latest_event_time = self
            .session
            .as_ref()
            .and_then(|s| s.buffer.last())
            .map(|c| c.close_time);
        self.recompute_and_render(latest_event_time);

        self.generation += 1;
        let sink = FeedSink::new(self.generation, self.feed_tx.clone());
        match self.feed_source.subscribe(&key, sink).await {
            Ok(handle) => {
                if let Some(session) = self.session.as_mut() {
                    session.feed = Some(handle);
                }
                self.state = SessionState::Live;
            }
            Err(e) => {
                let error = match e {
                    StreamError::FeedDisconnected(_) => e,
                    other => StreamError::FeedDisconnected(other.to_string()),
                };
                self.report(StatusEvent::Error {
                    key: Some(key),
                    error,
                });
                self.state = SessionState::Closed;
            }
        }
        self.state
    }

    /// Switch to another pair. Identical to [`start`](Self::start): the old
    /// feed is closed before the new snapshot is requested.
    pub async fn switch_to(&mut self, key: SessionKey) -> SessionState {
        self.start(key).await
    }

    /// Close the live feed and end the session. The buffer and the last
    /// frame stay as they were.
    pub async fn close(&mut self) {
        let had_feed = self.close_feed().await;
        if let Some(key) = self.key().cloned() {
            if had_feed || self.state != SessionState::Closed {
                self.report(StatusEvent::Closed {
                    key,
                    reason: "session closed".to_string(),
                });
            }
        }
        self.state = SessionState::Closed;
    }

    // -------------------------------------------------------------------------
    // Live feed events
    // -------------------------------------------------------------------------

    /// Wait for the next event from any subscription.
    pub async fn next_feed_message(&mut self) -> Option<FeedMessage> {
        self.feed_rx.recv().await
    }

    /// Route one feed event. Events from retired subscriptions are dropped.
    pub fn handle_feed_message(&mut self, msg: FeedMessage) {
        if msg.generation != self.generation || !self.has_live_feed() {
            debug!(
                generation = msg.generation,
                current = self.generation,
                "discarding event from retired feed"
            );
            return;
        }

        match msg.event {
            FeedEvent::Opened => {
                if let Some(key) = self.key().cloned() {
                    self.report(StatusEvent::Live { key });
                }
            }
            FeedEvent::Update(text) => {
                self.on_tick(&text);
            }
            FeedEvent::Error(detail) => {
                self.report(StatusEvent::Error {
                    key: self.key().cloned(),
                    error: StreamError::FeedDisconnected(detail),
                });
            }
            FeedEvent::Closed { code, reason } => {
                if let Some(session) = self.session.as_mut() {
                    session.feed = None;
                }
                self.generation += 1;
                self.state = SessionState::Closed;
                if let Some(key) = self.key().cloned() {
                    let reason = match code {
                        Some(code) => format!("feed closed ({code}): {reason}"),
                        None => format!("feed closed: {reason}"),
                    };
                    self.report(StatusEvent::Closed { key, reason });
                }
            }
        }
    }

    /// Parse one raw live update, merge it and re-render.
    pub fn on_tick(&mut self, raw: &str) -> TickOutcome {
        let Some(key) = self.key().cloned() else {
            return TickOutcome::Ignored;
        };

        let update = match parse_kline_event(raw) {
            Ok(Some(update)) => update,
            Ok(None) => return TickOutcome::Ignored,
            Err(e) => {
                let error = StreamError::MalformedTick(format!("{e:#}"));
                self.report(StatusEvent::TickDropped {
                    key,
                    error: error.clone(),
                });
                return TickOutcome::Dropped(error);
            }
        };

        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Ignored;
        };
        match session.buffer.upsert(update.candle) {
            Ok(outcome) => {
                debug!(
                    key = %key,
                    close = update.candle.close,
                    closed = update.is_closed,
                    outcome = ?outcome,
                    "candle update"
                );
                self.recompute_and_render(Some(update.event_time));
                TickOutcome::Applied(outcome)
            }
            Err(error) => {
                self.report(StatusEvent::TickDropped {
                    key,
                    error: error.clone(),
                });
                TickOutcome::Dropped(error)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Close the current feed, if any, and retire its generation. Returns
    /// whether a feed was open.
    async fn close_feed(&mut self) -> bool {
        let Some(mut feed) = self.session.as_mut().and_then(|s| s.feed.take()) else {
            return false;
        };
        feed.close(NORMAL_CLOSURE).await;
        self.generation += 1;
        if let Some(key) = self.key() {
            info!(key = %key, "live feed closed");
        }
        true
    }

    fn recompute_and_render(&mut self, latest_event_time: Option<i64>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let closes = session.buffer.closes();
        self.indicators = IndicatorSnapshot::compute(&closes, &self.params);

        let last = session.buffer.last();
        let frame = RenderFrame {
            key: session.key.clone(),
            candles: session.buffer.snapshot(),
            indicators: self.indicators.clone(),
            latest_close: last.map(|c| c.close),
            latest_high: last.map(|c| c.high),
            latest_low: last.map(|c| c.low),
            latest_event_time,
        };
        self.renderer.render(&frame);
    }

    fn report(&self, event: StatusEvent) {
        self.status.report(&event);
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("generation", &self.generation)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{
        kline_json, synthetic_candles, FakeFeedSource, RecordingRenderer, RecordingStatus,
        ScriptedSnapshotSource, MINUTE,
    };
    use crate::session::events::StatusKind;
    use crate::types::Trend;

    struct Harness {
        controller: SessionController,
        snapshots: Arc<ScriptedSnapshotSource>,
        feeds: Arc<FakeFeedSource>,
        renderer: Arc<RecordingRenderer>,
        status: Arc<RecordingStatus>,
    }

    fn harness(config: StreamConfig) -> Harness {
        let snapshots = Arc::new(ScriptedSnapshotSource::default());
        let feeds = Arc::new(FakeFeedSource::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let status = Arc::new(RecordingStatus::default());
        snapshots.attach_feed_probe(feeds.open_counter());
        let controller = SessionController::new(
            &config,
            snapshots.clone(),
            feeds.clone(),
            renderer.clone(),
            status.clone(),
        );
        Harness {
            controller,
            snapshots,
            feeds,
            renderer,
            status,
        }
    }

    fn key(symbol: &str) -> SessionKey {
        SessionKey::new(symbol, "1m").unwrap()
    }

    #[tokio::test]
    async fn start_seeds_renders_and_opens_one_feed() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 300, 100.0));

        let state = h.controller.start(key("BTCUSDT")).await;

        assert_eq!(state, SessionState::Live);
        assert_eq!(h.snapshots.requested_limits(), vec![300]);
        assert_eq!(h.feeds.open_count(), 1);
        assert_eq!(h.feeds.subscribe_count(), 1);

        let frame = h.renderer.last().expect("bootstrap frame");
        assert_eq!(frame.candles.len(), 300);
        assert_eq!(frame.latest_close, Some(frame.candles[299].close));
        assert_eq!(frame.latest_event_time, Some(299 * MINUTE + MINUTE - 1));
        assert_eq!(frame.indicators.trend, Trend::Up);
        assert_eq!(h.status.kinds(), vec![StatusKind::Loading]);
    }

    #[tokio::test]
    async fn opened_event_reports_live() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 10, 1.0));
        h.controller.start(key("BTCUSDT")).await;

        let msg = h.controller.next_feed_message().await.unwrap();
        assert_eq!(msg.event, FeedEvent::Opened);
        h.controller.handle_feed_message(msg);
        assert_eq!(h.status.kinds(), vec![StatusKind::Loading, StatusKind::Live]);
    }

    #[tokio::test]
    async fn snapshot_failure_from_idle_returns_to_idle_without_feed() {
        let mut h = harness(StreamConfig::default());
        h.snapshots
            .push_err(StreamError::SnapshotUnavailable("HTTP 503".into()));

        let state = h.controller.start(key("BTCUSDT")).await;

        assert_eq!(state, SessionState::Idle);
        assert_eq!(h.feeds.subscribe_count(), 0);
        assert!(h.renderer.frames().is_empty());
        assert_eq!(h.status.kinds(), vec![StatusKind::Loading, StatusKind::Error]);
        assert!(h.controller.session().is_none());
    }

    #[tokio::test]
    async fn snapshot_failure_after_live_keeps_last_frame_and_closes() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 50, 10.0));
        h.controller.start(key("BTCUSDT")).await;
        let frames_before = h.renderer.frames().len();

        h.snapshots
            .push_err(StreamError::SnapshotUnavailable("timeout".into()));
        let state = h.controller.switch_to(key("ETHUSDT")).await;

        assert_eq!(state, SessionState::Closed);
        assert_eq!(h.feeds.open_count(), 0);
        assert_eq!(h.feeds.subscribe_count(), 1);
        assert_eq!(h.renderer.frames().len(), frames_before);
        assert_eq!(h.controller.key(), Some(&key("BTCUSDT")));
        assert_eq!(h.controller.session().unwrap().buffer().len(), 50);
    }

    #[tokio::test]
    async fn switch_closes_old_feed_before_fetching() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 20, 1.0));
        h.snapshots.push_ok(synthetic_candles(0, 20, 2.0));
        h.controller.start(key("BTCUSDT")).await;
        h.controller.switch_to(key("ETHUSDT")).await;

        // The snapshot source records how many feeds were open at fetch time.
        assert_eq!(h.snapshots.open_feeds_at_fetch(), vec![0, 0]);
        assert_eq!(h.feeds.closed_codes(), vec![NORMAL_CLOSURE]);
        assert_eq!(h.feeds.open_count(), 1);
        assert_eq!(h.feeds.max_concurrent(), 1);
        assert_eq!(h.controller.key(), Some(&key("ETHUSDT")));
    }

    #[tokio::test]
    async fn stale_feed_events_are_discarded_after_switch() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 20, 1.0));
        h.snapshots.push_ok(synthetic_candles(0, 20, 2.0));
        h.controller.start(key("BTCUSDT")).await;
        let old_generation = h.controller.generation();
        h.controller.switch_to(key("ETHUSDT")).await;

        let before = h.controller.session().unwrap().buffer().snapshot();
        h.controller.handle_feed_message(FeedMessage {
            generation: old_generation,
            event: FeedEvent::Update(kline_json(20 * MINUTE, 999.0)),
        });
        assert_eq!(h.controller.session().unwrap().buffer().snapshot(), before);
    }

    #[tokio::test]
    async fn tick_replace_append_and_reject() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 30, 1.0));
        h.controller.start(key("BTCUSDT")).await;

        let last_open = 29 * MINUTE;
        assert_eq!(
            h.controller.on_tick(&kline_json(last_open, 5.0)),
            TickOutcome::Applied(UpsertOutcome::Replaced)
        );
        assert_eq!(h.controller.session().unwrap().buffer().len(), 30);

        assert_eq!(
            h.controller.on_tick(&kline_json(last_open + MINUTE, 6.0)),
            TickOutcome::Applied(UpsertOutcome::Appended)
        );
        let frame = h.renderer.last().unwrap();
        assert_eq!(frame.latest_close, Some(6.0));
        assert_eq!(frame.latest_event_time, Some(last_open + 2 * MINUTE - 1));

        let frames = h.renderer.frames().len();
        let outcome = h.controller.on_tick(&kline_json(last_open, 7.0));
        assert!(matches!(
            outcome,
            TickOutcome::Dropped(StreamError::OutOfOrderCandle { .. })
        ));
        assert_eq!(h.renderer.frames().len(), frames);
        assert_eq!(h.controller.state(), SessionState::Live);
        assert_eq!(h.status.last_kind(), Some(StatusKind::TickDropped));
    }

    #[tokio::test]
    async fn malformed_and_non_kline_payloads() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 5, 1.0));
        h.controller.start(key("BTCUSDT")).await;

        assert_eq!(h.controller.on_tick(r#"{"result":null,"id":1}"#), TickOutcome::Ignored);
        assert!(matches!(
            h.controller.on_tick("{ broken"),
            TickOutcome::Dropped(StreamError::MalformedTick(_))
        ));
        assert_eq!(h.controller.session().unwrap().buffer().len(), 5);
    }

    #[tokio::test]
    async fn tick_without_session_is_ignored() {
        let mut h = harness(StreamConfig::default());
        assert_eq!(h.controller.on_tick(&kline_json(0, 1.0)), TickOutcome::Ignored);
        assert!(h.renderer.frames().is_empty());
    }

    #[tokio::test]
    async fn feed_closed_event_transitions_to_closed() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 5, 1.0));
        h.controller.start(key("BTCUSDT")).await;
        let generation = h.controller.generation();

        h.controller.handle_feed_message(FeedMessage {
            generation,
            event: FeedEvent::Error("reset by peer".into()),
        });
        h.controller.handle_feed_message(FeedMessage {
            generation,
            event: FeedEvent::Closed {
                code: Some(1006),
                reason: "abnormal".into(),
            },
        });

        assert_eq!(h.controller.state(), SessionState::Closed);
        assert!(!h.controller.has_live_feed());
        assert_eq!(
            h.status.kinds(),
            vec![StatusKind::Loading, StatusKind::Error, StatusKind::Closed]
        );
        // Buffer survives the disconnect.
        assert_eq!(h.controller.session().unwrap().buffer().len(), 5);
    }

    #[tokio::test]
    async fn subscribe_failure_leaves_closed_session_with_frame() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 5, 1.0));
        h.feeds.fail_next_subscribe();

        let state = h.controller.start(key("BTCUSDT")).await;

        assert_eq!(state, SessionState::Closed);
        assert_eq!(h.renderer.frames().len(), 1);
        assert_eq!(h.feeds.open_count(), 0);
        assert_eq!(h.status.last_kind(), Some(StatusKind::Error));
    }

    #[tokio::test]
    async fn close_shuts_feed_and_reports() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 5, 1.0));
        h.controller.start(key("BTCUSDT")).await;

        h.controller.close().await;

        assert_eq!(h.controller.state(), SessionState::Closed);
        assert_eq!(h.feeds.open_count(), 0);
        assert_eq!(h.status.last_kind(), Some(StatusKind::Closed));
    }

    #[tokio::test]
    async fn end_to_end_300_seed_then_50_ticks() {
        let mut h = harness(StreamConfig::default());
        h.snapshots.push_ok(synthetic_candles(0, 300, 100.0));
        h.controller.start(key("BTCUSDT")).await;

        let mut last_open = 299 * MINUTE;
        let mut dropped = 0;
        for tick in 1..=50 {
            let len_before = h.controller.session().unwrap().buffer().len();
            let open_time = match tick {
                10 => last_open,
                30 => last_open - MINUTE,
                _ => last_open + MINUTE,
            };
            let outcome = h.controller.on_tick(&kline_json(open_time, 100.0 + tick as f64));
            let len_after = h.controller.session().unwrap().buffer().len();

            match tick {
                10 => {
                    assert_eq!(outcome, TickOutcome::Applied(UpsertOutcome::Replaced));
                    assert_eq!(len_after, len_before);
                }
                30 => {
                    assert!(matches!(
                        outcome,
                        TickOutcome::Dropped(StreamError::OutOfOrderCandle { .. })
                    ));
                    assert_eq!(len_after, len_before);
                    dropped += 1;
                }
                _ => {
                    assert_eq!(outcome, TickOutcome::Applied(UpsertOutcome::Appended));
                    last_open = open_time;
                }
            }
        }

        let buffer = h.controller.session().unwrap().buffer();
        assert_eq!(buffer.len(), 300 + 48);
        assert_eq!(dropped, 1);
        assert_eq!(h.status.count(StatusKind::TickDropped), 1);
        assert_eq!(h.controller.state(), SessionState::Live);

        // Indicators match a from-scratch recompute of the final buffer.
        let expected = IndicatorSnapshot::compute(&buffer.closes(), &IndicatorParams::default());
        assert_eq!(h.controller.indicators(), &expected);
        assert_eq!(h.renderer.last().unwrap().indicators, expected);
    }

    #[tokio::test]
    async fn end_to_end_is_capped_at_capacity() {
        let mut cfg = StreamConfig::default();
        cfg.capacity = 320;
        let mut h = harness(cfg);
        h.snapshots.push_ok(synthetic_candles(0, 300, 100.0));
        h.controller.start(key("BTCUSDT")).await;

        for i in 1..=50 {
            h.controller
                .on_tick(&kline_json((299 + i) * MINUTE, 100.0 + i as f64));
        }
        let buffer = h.controller.session().unwrap().buffer();
        assert_eq!(buffer.len(), 320);
        assert_eq!(buffer.last().unwrap().open_time, 349 * MINUTE);
    }

    #[tokio::test]
    async fn rapid_double_switch_leaves_one_feed() {
        let mut h = harness(StreamConfig::default());
        for _ in 0..3 {
            h.snapshots.push_ok(synthetic_candles(0, 10, 1.0));
        }
        h.controller.start(key("BTCUSDT")).await;
        h.controller.switch_to(key("ETHUSDT")).await;
        h.controller.switch_to(key("SOLUSDT")).await;

        assert_eq!(h.feeds.open_count(), 1);
        assert_eq!(h.feeds.max_concurrent(), 1);
        assert_eq!(h.feeds.subscribe_count(), 3);
        assert_eq!(h.controller.key(), Some(&key("SOLUSDT")));
    }
}
