//! Call logging and metrics
//!
//! Every attempted provider call becomes one [`CallRecord`] appended to a
//! [`CallSink`]. The logger also folds each record into in-memory
//! [`Metrics`]. A failing sink is logged and ignored; recording never fails
//! the call being recorded.

pub mod metrics;
pub mod record;
pub mod sink;

pub use metrics::{Metrics, ProviderMetrics};
pub use record::{CallRecord, CallStatus, FailureKind};
pub use sink::{parse_lines, CallSink, JsonlFileSink, MemorySink};

use crate::clock::Clock;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

pub struct CallLogger {
    sink: Arc<dyn CallSink>,
    metrics: Mutex<Metrics>,
    clock: Arc<dyn Clock>,
}

impl CallLogger {
    pub fn new(sink: Arc<dyn CallSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            metrics: Mutex::new(Metrics::default()),
            clock,
        }
    }

    /// Logger backed by a JSONL file
    pub fn jsonl(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(JsonlFileSink::new(path)), clock)
    }

    /// Logger that keeps records in memory
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemorySink::new()), clock)
    }

    /// Record one call outcome, timestamped now
    pub fn record(
        &self,
        provider: &str,
        method: &str,
        duration: Duration,
        status: CallStatus,
        error: Option<&str>,
    ) {
        let now = self.clock.now();
        let entry = match status {
            CallStatus::Success => CallRecord::success(provider, method, duration, now),
            CallStatus::Error => CallRecord::failure(
                provider,
                method,
                duration,
                error.unwrap_or("unknown error"),
                FailureKind::ProviderError,
                now,
            ),
        };
        self.record_entry(entry);
    }

    /// Record a fully built entry
    pub fn record_entry(&self, record: CallRecord) {
        if let Err(e) = self.sink.append(&record) {
            warn!(provider = %record.provider, error = %e, "failed to append call record");
        }
        self.lock_metrics().apply(&record);
    }

    /// Records for `provider` no older than `window`, re-read from the sink
    ///
    /// An unreadable sink yields an empty list.
    pub fn recent_calls(&self, provider: &str, window: Duration) -> Vec<CallRecord> {
        let cutoff = self.clock.now_ms() as i64 - window.as_millis() as i64;
        match self.sink.read_all() {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.provider == provider && r.timestamp_ms() >= cutoff)
                .collect(),
            Err(e) => {
                warn!(provider, error = %e, "failed to read call log");
                Vec::new()
            }
        }
    }

    /// Snapshot of the running totals
    pub fn metrics(&self) -> Metrics {
        self.lock_metrics().clone()
    }

    /// Markdown summary of the running totals
    pub fn report(&self) -> String {
        self.lock_metrics().report()
    }

    pub fn sink(&self) -> &Arc<dyn CallSink> {
        &self.sink
    }

    fn lock_metrics(&self) -> MutexGuard<'_, Metrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
