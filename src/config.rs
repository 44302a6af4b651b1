// =============================================================================
// Stream Configuration — JSON file with serde defaults and env overrides
// =============================================================================
//
// Every recognised option is an explicit field. All fields carry
// `#[serde(default)]` so that an older or partial file always loads.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StreamError;
use crate::types::SessionKey;

/// Binance caps `/api/v3/klines` at 1000 rows per request.
pub const MAX_SNAPSHOT_LIMIT: usize = 1000;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_capacity() -> usize {
    500
}

fn default_sma_periods() -> Vec<usize> {
    vec![20, 60]
}

fn default_rsi_period() -> usize {
    14
}

fn default_snapshot_limit() -> usize {
    300
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_rest_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_ws_base_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// StreamConfig
// =============================================================================

/// Top-level configuration for the candle stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    // --- Core ------------------------------------------------------------

    /// Maximum number of candles kept in the buffer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// SMA look-back periods. The first two drive the trend label
    /// (fast, slow); any further periods are only charted.
    #[serde(default = "default_sma_periods")]
    pub sma_periods: Vec<usize>,

    /// Wilder RSI look-back period.
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Number of historical candles requested when a session starts.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,

    // --- Initial session -------------------------------------------------

    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default = "default_interval")]
    pub interval: String,

    // --- Transport & API -------------------------------------------------

    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            sma_periods: default_sma_periods(),
            rsi_period: default_rsi_period(),
            snapshot_limit: default_snapshot_limit(),
            symbol: default_symbol(),
            interval: default_interval(),
            rest_base_url: default_rest_base_url(),
            ws_base_url: default_ws_base_url(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl StreamConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("config at {} failed validation", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            interval = %config.interval,
            capacity = config.capacity,
            "stream config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "stream config saved (atomic)");
        Ok(())
    }

    /// Record `key` as the pair to resume with next time.
    ///
    /// Re-reads the file at `path` and changes only `symbol` and `interval`,
    /// so values that came from environment overrides or defaults are never
    /// written back. A file that is missing or fails to load is left
    /// untouched and an error is returned.
    pub fn remember_session(path: impl AsRef<Path>, key: &SessionKey) -> Result<()> {
        let path = path.as_ref();
        let mut on_disk = Self::load(path).with_context(|| {
            format!("not updating {}: existing config did not load", path.display())
        })?;
        if on_disk.symbol == key.symbol && on_disk.interval == key.interval {
            return Ok(());
        }
        on_disk.symbol = key.symbol.clone();
        on_disk.interval = key.interval.clone();
        on_disk.save(path)
    }

    /// Apply `KLINE_WATCH_*` environment overrides for the initial session
    /// and the API bind address.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(symbol) = std::env::var("KLINE_WATCH_SYMBOL") {
            if !symbol.trim().is_empty() {
                self.symbol = symbol.trim().to_uppercase();
            }
        }
        if let Ok(interval) = std::env::var("KLINE_WATCH_INTERVAL") {
            if !interval.trim().is_empty() {
                self.interval = interval.trim().to_string();
            }
        }
        if let Ok(addr) = std::env::var("KLINE_WATCH_BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr.trim().to_string();
            }
        }
    }

    /// Check value ranges. Called by [`StreamConfig::load`].
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.capacity == 0 {
            return Err(StreamError::InvalidConfig("capacity must be >= 1".into()));
        }
        if self.sma_periods.len() < 2 {
            return Err(StreamError::InvalidConfig(
                "sma_periods needs a fast and a slow period".into(),
            ));
        }
        if self.sma_periods.contains(&0) {
            return Err(StreamError::InvalidConfig("sma periods must be >= 1".into()));
        }
        if self.rsi_period == 0 {
            return Err(StreamError::InvalidConfig("rsi_period must be >= 1".into()));
        }
        if self.snapshot_limit == 0 || self.snapshot_limit > MAX_SNAPSHOT_LIMIT {
            return Err(StreamError::InvalidConfig(format!(
                "snapshot_limit must be within 1..={MAX_SNAPSHOT_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Fast SMA period (first configured entry).
    pub fn sma_fast(&self) -> usize {
        self.sma_periods.first().copied().unwrap_or(20)
    }

    /// Slow SMA period (second configured entry).
    pub fn sma_slow(&self) -> usize {
        self.sma_periods.get(1).copied().unwrap_or(60)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.capacity, 500);
        assert_eq!(cfg.sma_periods, vec![20, 60]);
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.snapshot_limit, 300);
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.interval, "1m");
        assert_eq!(cfg.sma_fast(), 20);
        assert_eq!(cfg.sma_slow(), 60);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, StreamConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "capacity": 120, "sma_periods": [5, 10, 50] }"#;
        let cfg: StreamConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.capacity, 120);
        assert_eq!(cfg.sma_fast(), 5);
        assert_eq!(cfg.sma_slow(), 10);
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.ws_base_url, "wss://stream.binance.com:9443/ws");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = StreamConfig::default();
        cfg.capacity = 0;
        assert!(matches!(cfg.validate(), Err(StreamError::InvalidConfig(_))));

        let mut cfg = StreamConfig::default();
        cfg.sma_periods = vec![20];
        assert!(cfg.validate().is_err());

        let mut cfg = StreamConfig::default();
        cfg.sma_periods = vec![0, 60];
        assert!(cfg.validate().is_err());

        let mut cfg = StreamConfig::default();
        cfg.snapshot_limit = MAX_SNAPSHOT_LIMIT + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kline_watch.json");

        let mut cfg = StreamConfig::default();
        cfg.symbol = "ETHUSDT".into();
        cfg.capacity = 250;
        cfg.save(&path).unwrap();

        let loaded = StreamConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn remember_session_keeps_user_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kline_watch.json");
        std::fs::write(
            &path,
            r#"{"capacity":900,"rest_base_url":"https://my-proxy"}"#,
        )
        .unwrap();

        let key = SessionKey::new("ethusdt", "15m").unwrap();
        StreamConfig::remember_session(&path, &key).unwrap();

        let saved = StreamConfig::load(&path).unwrap();
        assert_eq!(saved.symbol, "ETHUSDT");
        assert_eq!(saved.interval, "15m");
        assert_eq!(saved.capacity, 900);
        assert_eq!(saved.rest_base_url, "https://my-proxy");
        assert_eq!(saved.bind_addr, StreamConfig::default().bind_addr);
    }

    #[test]
    fn remember_session_leaves_invalid_file_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kline_watch.json");
        let original = r#"{"capacity":900,"snapshot_limit":5000,"rest_base_url":"https://my-proxy"}"#;
        std::fs::write(&path, original).unwrap();

        let key = SessionKey::new("BTCUSDT", "1m").unwrap();
        assert!(StreamConfig::remember_session(&path, &key).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

        let missing = dir.path().join("absent.json");
        assert!(StreamConfig::remember_session(&missing, &key).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(StreamConfig::load("/nonexistent/kline_watch.json").is_err());
    }
}
