// ---------------------------------------------------------------------------
// Kline event parsing
// ---------------------------------------------------------------------------

use anyhow::{Context, Result};

use super::candle_buffer::Candle;

/// One parsed live-feed interval update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KlineUpdate {
    pub candle: Candle,
    /// Authoritative close timestamp of the interval (`k.T`).
    pub event_time: i64,
    /// Whether the interval has finished (`k.x`).
    pub is_closed: bool,
}

/// Parse a raw kline event.
///
/// Accepts both the single-stream payload and the combined-stream envelope:
/// ```json
/// { "e": "kline", "s": "BTCUSDT", "k": { "t": .., "T": .., "o": "..", ... } }
/// { "stream": "btcusdt@kline_1m", "data": { "e": "kline", "k": { ... } } }
/// ```
///
/// Returns `Ok(None)` for payloads that carry no kline object (subscription
/// acks and similar).
pub fn parse_kline_event(text: &str) -> Result<Option<KlineUpdate>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let k = match data.get("k") {
        Some(k) if k.is_object() => k,
        _ => return Ok(None),
    };

    let open_time = k["t"].as_i64().context("missing field k.t")?;
    let close_time = k["T"].as_i64().context("missing field k.T")?;

    let open = parse_string_f64(&k["o"], "k.o")?;
    let high = parse_string_f64(&k["h"], "k.h")?;
    let low = parse_string_f64(&k["l"], "k.l")?;
    let close = parse_string_f64(&k["c"], "k.c")?;

    let is_closed = k["x"].as_bool().unwrap_or(false);

    Ok(Some(KlineUpdate {
        candle: Candle::new(open_time, open, high, low, close, close_time),
        event_time: close_time,
        is_closed,
    }))
}

/// Helper: Binance sends numeric values as JSON strings inside kline objects.
pub(crate) fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    let v = match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}"))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64"))?,
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    };
    if !v.is_finite() {
        anyhow::bail!("field {name} is not finite");
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
