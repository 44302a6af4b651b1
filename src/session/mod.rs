// =============================================================================
// Session Module
// =============================================================================
//
// One viewing session: bootstrap from a historical snapshot, then stay live
// on exactly one feed subscription, re-rendering after every change.

pub mod controller;
pub mod driver;
pub mod events;
pub mod feed;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Session, SessionController, TickOutcome};
pub use driver::{run_session, SessionCommand};
pub use events::{
    log_status, RenderFrame, Renderer, StatusEvent, StatusKind, StatusSink, TracingStatusSink,
};
pub use feed::{
    FeedEvent, FeedHandle, FeedMessage, FeedSink, HistoricalSnapshotSource, LiveFeedSource,
    NORMAL_CLOSURE,
};
