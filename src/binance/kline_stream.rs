// ---------------------------------------------------------------------------
// Kline WebSocket feed
// ---------------------------------------------------------------------------
//
// One connection per subscription: `<ws_base>/<symbol>@kline_<interval>`.
// Raw text frames are forwarded to the session as `FeedEvent::Update`; the
// session does the parsing. Closing a handle sends a close frame, waits
// briefly for the server's reply, and only returns once the reader task has
// exited, so nothing from that connection is delivered afterwards.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::StreamError;
use crate::session::{FeedEvent, FeedHandle, FeedSink, LiveFeedSource, NORMAL_CLOSURE};
use crate::types::SessionKey;

/// How long `close` waits for the reader task before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live feed backed by the Binance kline WebSocket stream.
#[derive(Debug, Clone)]
pub struct BinanceKlineFeed {
    ws_base_url: String,
}

impl BinanceKlineFeed {
    /// `ws_base_url` is the raw-stream base, e.g.
    /// `wss://stream.binance.com:9443/ws`.
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full stream URL for `key`.
    pub fn stream_url(&self, key: &SessionKey) -> String {
        format!("{}/{}", self.ws_base_url, key.stream_name())
    }
}

#[async_trait]
impl LiveFeedSource for BinanceKlineFeed {
    async fn subscribe(
        &self,
        key: &SessionKey,
        sink: FeedSink,
    ) -> Result<Box<dyn FeedHandle>, StreamError> {
        let url = self.stream_url(key);
        info!(url = %url, key = %key, generation = sink.generation(), "connecting to kline WebSocket");

        let (ws_stream, _response) = connect_async(&url)
            .await
            .context("failed to connect to kline WebSocket")
            .map_err(|e| StreamError::FeedDisconnected(format!("{e:#}")))?;

        info!(key = %key, "kline WebSocket connected");
        sink.send(FeedEvent::Opened);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pump(ws_stream, sink, shutdown_rx, key.clone()));

        Ok(Box::new(KlineStreamHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }))
    }
}

/// Handle for one open kline connection.
struct KlineStreamHandle {
    shutdown: Option<oneshot::Sender<u16>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl FeedHandle for KlineStreamHandle {
    async fn close(&mut self, code: u16) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(code);
        }
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            warn!("kline reader did not stop in time -- aborting");
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for KlineStreamHandle {
    fn drop(&mut self) {
        // A handle dropped without `close` must not leave a reader behind.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Forward frames from `ws` into `sink` until the server closes, a read
/// fails, or `shutdown` fires.
async fn pump(ws: WsStream, sink: FeedSink, mut shutdown: oneshot::Receiver<u16>, key: SessionKey) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            code = &mut shutdown => {
                let code = code.unwrap_or(NORMAL_CLOSURE);
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: "session switched".into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(key = %key, error = %e, "failed to send close frame");
                    return;
                }
                // Drain until the server acknowledges; nothing is forwarded.
                let drain = async {
                    while let Some(Ok(msg)) = read.next().await {
                        if msg.is_close() {
                            break;
                        }
                    }
                };
                let _ = tokio::time::timeout(Duration::from_secs(2), drain).await;
                info!(key = %key, code, "kline WebSocket closed by session");
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !sink.send(FeedEvent::Update(text)) {
                        debug!(key = %key, "session gone -- stopping kline reader");
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, "closed by server".to_string()),
                    };
                    warn!(key = %key, ?code, reason = %reason, "kline WebSocket closed by server");
                    sink.send(FeedEvent::Closed { code, reason });
                    return;
                }
                // Ping / Pong / Binary frames -- tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(key = %key, error = %e, "kline WebSocket read error");
                    sink.send(FeedEvent::Error(e.to_string()));
                    sink.send(FeedEvent::Closed {
                        code: None,
                        reason: "read error".to_string(),
                    });
                    return;
                }
                None => {
                    warn!(key = %key, "kline WebSocket stream ended");
                    sink.send(FeedEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            }
        }
    }
}
