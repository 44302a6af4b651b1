// =============================================================================
// Request-Weight Tracker — keeps kline history requests under Binance limits
// =============================================================================
//
// Binance caps request weight at 1200 per minute per IP (we hard-cap
// ourselves at 1000). Every REST response carries `X-MBX-USED-WEIGHT-1M`;
// the tracker stores it together with the UTC minute it was observed in, so
// a reading from an earlier minute counts as zero.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Request weight of `GET /api/v3/klines` for a given `limit`.
pub fn klines_weight(limit: usize) -> u32 {
    match limit {
        0..=100 => 2,
        101..=500 => 5,
        _ => 10,
    }
}

/// Thread-safe weight tracker backed by atomic counters.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    observed_minute: AtomicI64,
}

/// Immutable snapshot of the current weight usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
}

impl RateLimitTracker {
    /// Create a new tracker with the counter at zero.
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            observed_minute: AtomicI64::new(0),
        }
    }

    pub(crate) fn current_minute() -> i64 {
        Utc::now().timestamp().div_euclid(60)
    }

    // -------------------------------------------------------------------------
    // Header-based updates
    // -------------------------------------------------------------------------

    /// Update the counter from the `X-MBX-USED-WEIGHT-1M` response header.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(w) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };
        self.record_weight(w, Self::current_minute());
    }

    pub(crate) fn record_weight(&self, weight: u32, minute: i64) {
        let prev = self.weight_at(minute);
        self.used_weight_1m.store(weight, Ordering::Relaxed);
        self.observed_minute.store(minute, Ordering::Relaxed);

        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "rate-limit weight updated from header");
    }

    /// Weight used during `minute`; zero if the last reading is older.
    fn weight_at(&self, minute: i64) -> u32 {
        if self.observed_minute.load(Ordering::Relaxed) == minute {
            self.used_weight_1m.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    // -------------------------------------------------------------------------
    // Pre-flight checks
    // -------------------------------------------------------------------------

    /// Return `true` if we can afford to spend `weight` more request weight
    /// without exceeding the hard limit.
    pub fn can_send_request(&self, weight: u32) -> bool {
        self.can_send_at(weight, Self::current_minute())
    }

    fn can_send_at(&self, weight: u32, minute: i64) -> bool {
        let current = self.weight_at(minute);
        let allowed = current.saturating_add(weight) <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked, would exceed rate-limit"
            );
        }
        allowed
    }

    /// Produce a serialisable snapshot of the current counter.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.weight_at(Self::current_minute()),
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("observed_minute", &self.observed_minute.load(Ordering::Relaxed))
            .finish()
    }
}
