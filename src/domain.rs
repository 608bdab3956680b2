//! ==============================================================================
//! domain.rs - the reading value type
//! ==============================================================================
//!
//! purpose:
//!     one temperature/humidity sample, shared by every part of the host:
//!     the parser produces it, the cache holds it, the store persists it and
//!     the http layer serialises it.
//!
//! relationships:
//!     - produced by: parser.rs
//!     - held by: cache.rs
//!     - persisted by: store.rs
//!
//! ==============================================================================

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// a temperature/humidity sample
///
/// `id` is 0 for readings that only live in memory; the store assigns the
/// real id on insert.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    /// degrees celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// local capture time, millisecond precision
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// new in-memory reading captured now
    pub fn now(temperature: f64, humidity: f64) -> Self {
        Self::at(temperature, humidity, now_millis())
    }

    /// new in-memory reading with an explicit capture time
    pub fn at(temperature: f64, humidity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            temperature,
            humidity,
            timestamp: truncate_millis(timestamp),
        }
    }

    /// the zero reading (0°, 0%) the cache starts from
    pub fn zero() -> Self {
        Self::now(0.0, 0.0)
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// same sample ignoring the store-assigned id
    pub fn same_sample(&self, other: &Reading) -> bool {
        self.temperature == other.temperature
            && self.humidity == other.humidity
            && self.timestamp == other.timestamp
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reading{{id={}, T={} ºC, HR={} %, time={}}}",
            self.id,
            self.temperature,
            self.humidity,
            self.timestamp.with_timezone(&Local).format("%a %b %d %H:%M:%S %Y")
        )
    }
}

/// current wall-clock time truncated to whole milliseconds
///
/// the store keeps epoch milliseconds, so readings are created at that
/// precision and survive a round-trip unchanged.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// epoch milliseconds -> utc instant (out-of-range values clamp to the epoch)
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(t.timestamp_millis())
}
