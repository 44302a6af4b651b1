use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One interval's OHLC candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, close_time: i64) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
        }
    }
}

/// What a successful [`CandleBuffer::upsert`] did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The in-progress candle was replaced in place.
    Replaced,
    /// A new, later candle was appended.
    Appended,
    /// A new candle was appended and the oldest one evicted.
    AppendedEvicted,
}

// ---------------------------------------------------------------------------
// CandleBuffer -- bounded, time-ordered candle series
// ---------------------------------------------------------------------------

/// Bounded ring of candles for one (symbol, interval) series.
///
/// Candles are strictly ascending by `open_time`. The newest candle may be
/// replaced in place while its interval is still forming; once the length
/// would exceed `capacity` the oldest candle is dropped from the front.
/// Mutation happens only through [`seed`](Self::seed) and
/// [`upsert`](Self::upsert).
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    ring: VecDeque<Candle>,
    capacity: usize,
}

impl CandleBuffer {
    /// Create an empty buffer holding at most `capacity` candles
    /// (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Replace the contents wholesale with `candles`, keeping only the
    /// trailing `capacity` entries. The caller guarantees ascending,
    /// deduplicated input.
    pub fn seed(&mut self, candles: &[Candle]) {
        let start = candles.len().saturating_sub(self.capacity);
        self.ring.clear();
        self.ring.extend(candles[start..].iter().copied());
    }

    /// Merge one incoming candle.
    ///
    /// * Same `open_time` as the newest candle: replace it in place.
    /// * Later `open_time`: append, evicting the oldest candle if the
    ///   capacity is exceeded.
    /// * Earlier `open_time`: rejected with [`StreamError::OutOfOrderCandle`],
    ///   buffer untouched.
    pub fn upsert(&mut self, candle: Candle) -> Result<UpsertOutcome, StreamError> {
        if let Some(last) = self.ring.back_mut() {
            if candle.open_time == last.open_time {
                *last = candle;
                return Ok(UpsertOutcome::Replaced);
            }
            if candle.open_time < last.open_time {
                return Err(StreamError::OutOfOrderCandle {
                    incoming: candle.open_time,
                    last: last.open_time,
                });
            }
        }

        self.ring.push_back(candle);
        if self.ring.len() > self.capacity {
            self.ring.pop_front();
            return Ok(UpsertOutcome::AppendedEvicted);
        }
        Ok(UpsertOutcome::Appended)
    }

    /// Close prices in buffer order (oldest first).
    pub fn closes(&self) -> Vec<f64> {
        self.ring.iter().map(|c| c.close).collect()
    }

    /// Most recent candle, if any.
    pub fn last(&self) -> Option<Candle> {
        self.ring.back().copied()
    }

    /// Immutable copy of the buffer contents, oldest first.
    pub fn snapshot(&self) -> Vec<Candle> {
        self.ring.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
