// =============================================================================
// Binance REST Client — public kline history
// =============================================================================
//
// Only the unauthenticated `/api/v3/klines` endpoint is used. The response is
// an array of arrays; each row is converted into a `Candle`. Request weight
// is tracked from response headers and checked before each call.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::rate_limit::{klines_weight, RateLimitTracker};
use crate::error::StreamError;
use crate::market_data::kline::parse_string_f64;
use crate::market_data::Candle;
use crate::session::HistoricalSnapshotSource;
use crate::types::SessionKey;

/// Binance public REST client.
#[derive(Clone)]
pub struct BinanceRestClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceRestClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a client against `base_url` (e.g. `https://api.binance.com`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "BinanceRestClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        })
    }

    /// Shared weight tracker for this client.
    pub fn rate_limit(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limit
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public — no signature required).
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ...
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        if !self.rate_limit.can_send_request(klines_weight(limit)) {
            anyhow::bail!("request weight limit reached, retry next minute");
        }

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        if !status.is_success() {
            // Error bodies are not always JSON (CDN pages, empty 429s).
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Binance GET /api/v3/klines returned {}: {}",
                status,
                text.trim()
            );
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

#[async_trait]
impl HistoricalSnapshotSource for BinanceRestClient {
    async fn fetch(&self, key: &SessionKey, limit: usize) -> Result<Vec<Candle>, StreamError> {
        self.get_klines(&key.symbol, &key.interval, limit)
            .await
            .map_err(|e| StreamError::SnapshotUnavailable(format!("{e:#}")))
    }
}

impl std::fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit.snapshot())
            .finish()
    }
}

// -------------------------------------------------------------------------
// Internal helpers
// -------------------------------------------------------------------------

/// Convert a klines response body into candles, skipping short rows and
/// enforcing strictly ascending open times.
fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles: Vec<Candle> = Vec::with_capacity(raw.len());

    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time = arr[0].as_i64().context("kline openTime is not an integer")?;
        let open = parse_string_f64(&arr[1], "open")?;
        let high = parse_string_f64(&arr[2], "high")?;
        let low = parse_string_f64(&arr[3], "low")?;
        let close = parse_string_f64(&arr[4], "close")?;
        let close_time = arr[6].as_i64().context("kline closeTime is not an integer")?;

        if let Some(prev) = candles.last() {
            if open_time <= prev.open_time {
                warn!(open_time, prev = prev.open_time, "skipping non-ascending kline row");
                continue;
            }
        }

        candles.push(Candle::new(open_time, open, high, low, close, close_time));
    }

    Ok(candles)
}
