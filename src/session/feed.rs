// =============================================================================
// Collaborator interfaces — historical snapshot and live feed
// =============================================================================
//
// The session controller only talks to these traits. Concrete transports
// (Binance REST + WebSocket) live in `crate::binance`; tests use scripted
// fakes.
// =============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::market_data::Candle;
use crate::types::SessionKey;

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Source of the bootstrap candle history.
#[async_trait]
pub trait HistoricalSnapshotSource: Send + Sync {
    /// Fetch up to `limit` candles, ascending by open time and free of
    /// duplicates. Fails with [`StreamError::SnapshotUnavailable`].
    async fn fetch(&self, key: &SessionKey, limit: usize) -> Result<Vec<Candle>, StreamError>;
}

/// Events a live feed delivers for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The connection is established.
    Opened,
    /// One raw interval-update payload.
    Update(String),
    /// The connection is gone; no further events follow.
    Closed { code: Option<u16>, reason: String },
    /// A transport error; usually followed by `Closed`.
    Error(String),
}

/// A [`FeedEvent`] stamped with the generation of the subscription that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub generation: u64,
    pub event: FeedEvent,
}

/// Sending half handed to a live feed at subscribe time. Every event is
/// tagged with the subscription's generation so the controller can discard
/// anything produced by a superseded feed.
#[derive(Debug, Clone)]
pub struct FeedSink {
    generation: u64,
    tx: mpsc::UnboundedSender<FeedMessage>,
}

impl FeedSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<FeedMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` once the controller is gone.
    pub fn send(&self, event: FeedEvent) -> bool {
        self.tx
            .send(FeedMessage {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Handle to one open live-feed subscription.
#[async_trait]
pub trait FeedHandle: Send {
    /// Close the subscription with the given WebSocket close code. Returns
    /// once the feed can no longer emit events. Closing twice is a no-op.
    async fn close(&mut self, code: u16);
}

/// Source of live interval updates.
#[async_trait]
pub trait LiveFeedSource: Send + Sync {
    /// Open exactly one subscription for `key`, delivering into `sink`.
    /// Fails with [`StreamError::FeedDisconnected`] when the subscription
    /// cannot be started.
    async fn subscribe(
        &self,
        key: &SessionKey,
        sink: FeedSink,
    ) -> Result<Box<dyn FeedHandle>, StreamError>;
}
