//! Aggregate call statistics derived from call records

use super::record::CallRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderMetrics {
    pub calls: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
}

impl ProviderMetrics {
    pub fn average_duration_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.calls as f64
        }
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64 * 100.0
        }
    }
}

/// Running totals; a cache over the call log, never a source of truth
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_calls: u64,
    pub total_errors: u64,
    /// Sum of per-provider durations over `total_calls`
    pub average_duration_ms: f64,
    /// Keyed by provider name; ordered so reports are deterministic
    pub by_provider: BTreeMap<String, ProviderMetrics>,
}

impl Metrics {
    /// Rebuild from a sequence of records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a CallRecord>) -> Self {
        let mut metrics = Self::default();
        for record in records {
            metrics.apply(record);
        }
        metrics
    }

    /// Fold one record into the totals
    pub fn apply(&mut self, record: &CallRecord) {
        self.total_calls += 1;
        let entry = self.by_provider.entry(record.provider.clone()).or_default();
        entry.calls += 1;
        entry.total_duration_ms += record.duration;

        if record.is_error() {
            self.total_errors += 1;
            entry.errors += 1;
        }

        let total_duration: u64 = self
            .by_provider
            .values()
            .map(|p| p.total_duration_ms)
            .sum();
        self.average_duration_ms = total_duration as f64 / self.total_calls as f64;
    }

    pub fn error_rate_percent(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_calls as f64 * 100.0
        }
    }

    /// Markdown summary for CLI or dashboard display
    pub fn report(&self) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = self.write_report(&mut out);
        out
    }

    fn write_report(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "# Call Report\n")?;
        writeln!(out, "## Overall Metrics")?;
        writeln!(out, "- Total Calls: {}", self.total_calls)?;
        writeln!(out, "- Total Errors: {}", self.total_errors)?;
        writeln!(out, "- Average Duration: {:.2}ms", self.average_duration_ms)?;
        writeln!(out, "- Error Rate: {:.1}%\n", self.error_rate_percent())?;
        writeln!(out, "## By Provider")?;

        if self.by_provider.is_empty() {
            writeln!(out, "- no calls recorded")?;
        }
        for (name, stats) in &self.by_provider {
            writeln!(
                out,
                "- {}: {} calls, {} errors ({:.1}%), avg {:.2}ms",
                name,
                stats.calls,
                stats.errors,
                stats.error_rate_percent(),
                stats.average_duration_ms()
            )?;
        }
        Ok(())
    }
}
