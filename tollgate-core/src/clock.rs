//! Time sources for admission windows and call records
//!
//! Everything that compares timestamps (window buckets, backoff expiry,
//! sliding error windows) reads wall-clock milliseconds through [`Clock`],
//! so the limiter and logger can be driven deterministically in tests.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;

    /// Current time as a UTC timestamp
    fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.now_ms())
    }
}

/// Wall clock anchored to the tokio timer
///
/// The epoch offset is captured once at construction; elapsed time is then
/// measured with `tokio::time::Instant`, so a paused tokio runtime freezes
/// (and auto-advances) this clock together with `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch_ms: u64,
    anchor: tokio::time::Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current wall-clock time
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            epoch_ms,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now_ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at the given epoch milliseconds
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Convert epoch milliseconds into a UTC timestamp
pub fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
