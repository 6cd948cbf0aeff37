//! Subcommand implementations; each returns the text to print

use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;
use tollgate_core::calls::{CallRecord, CallSink, FailureKind, JsonlFileSink, Metrics};
use tollgate_core::config::{self, CircuitConfig};
use tollgate_core::ProviderRegistry;
use tracing::debug;

fn read_log(path: &Path) -> Result<Vec<CallRecord>> {
    let records = JsonlFileSink::new(path)
        .read_all()
        .with_context(|| format!("failed to read call log '{}'", path.display()))?;
    debug!(records = records.len(), path = %path.display(), "call log loaded");
    Ok(records)
}

/// Markdown metrics report rebuilt from a call log
pub fn report(log: &Path) -> Result<String> {
    let records = read_log(log)?;
    Ok(Metrics::from_records(&records).report())
}

/// Validate a config file and describe the resolved registry
pub fn check_config(path: &Path) -> Result<String> {
    let config = config::load(path)
        .with_context(|| format!("invalid configuration '{}'", path.display()))?;
    let registry = ProviderRegistry::from_config(&config)?;

    let mut out = String::new();
    writeln!(
        out,
        "{}: ok ({} providers, validation: {:?})",
        path.display(),
        registry.len(),
        config.validation
    )?;
    writeln!(out, "priority order:")?;
    for (i, spec) in registry.enabled().enumerate() {
        writeln!(
            out,
            "  {}. {} (priority {}, timeout {}ms, retries {}, {} calls / {}ms)",
            i + 1,
            spec.name,
            spec.priority,
            spec.timeout.as_millis(),
            spec.max_retries,
            spec.rate_limit.max_calls,
            spec.rate_limit.window_size.as_millis()
        )?;
    }

    let disabled: Vec<&str> = registry
        .all()
        .iter()
        .filter(|p| !p.enabled)
        .map(|p| p.name.as_str())
        .collect();
    if !disabled.is_empty() {
        writeln!(out, "disabled: {}", disabled.join(", "))?;
    }
    Ok(out)
}

/// Per-provider window usage reconstructed from a call log at `now_ms`
///
/// Rate-limited records never reached the provider and are not counted.
pub fn status(config_path: &Path, log: &Path, now_ms: u64) -> Result<String> {
    let config = config::load(config_path)
        .with_context(|| format!("invalid configuration '{}'", config_path.display()))?;
    let registry = ProviderRegistry::from_config(&config)?;
    let records = read_log(log)?;
    let circuit: CircuitConfig = config.circuit;

    let mut out = String::new();
    writeln!(out, "{:<20} {:>9} {:>8} {:>7}  state", "provider", "window", "usage", "errors")?;
    for spec in registry.all() {
        let window_ms = (spec.rate_limit.window_size.as_millis() as u64).max(1);
        let bucket = now_ms / window_ms;
        let error_cutoff = now_ms.saturating_sub(circuit.error_window_ms) as i64;

        let ours = records.iter().filter(|r| r.provider == spec.name);
        let (mut used, mut errors) = (0u32, 0usize);
        for record in ours {
            let at = record.timestamp_ms().max(0) as u64;
            let admitted = record.kind != Some(FailureKind::RateLimited);
            if admitted && at / window_ms == bucket {
                used += 1;
            }
            let counts = record.is_error()
                && record.kind.map_or(true, |k| k.counts_toward_circuit());
            if counts && record.timestamp_ms() >= error_cutoff {
                errors += 1;
            }
        }

        let max = spec.rate_limit.max_calls;
        let state = if !spec.enabled {
            "disabled"
        } else if used >= max || errors >= circuit.error_threshold as usize {
            "tripped"
        } else {
            "ok"
        };
        writeln!(
            out,
            "{:<20} {:>9} {:>7.1}% {:>7}  {}",
            spec.name,
            format!("{}/{}", used, max),
            f64::from(used) / f64::from(max.max(1)) * 100.0,
            errors,
            state
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tollgate_core::clock::millis_to_datetime;

    const CONFIG: &str = r#"
version: "1"
providers:
  - name: nvidia
    priority: 1
    timeout_ms: 30000
    max_retries: 2
    max_calls_per_window: 10
  - name: mistral
    priority: 2
    timeout_ms: 30000
    max_retries: 0
  - name: tesseract
    enabled: false
    priority: 0
    timeout_ms: 5000
    max_retries: 0
"#;

    fn write_log(dir: &Path, records: &[CallRecord]) -> std::path::PathBuf {
        let path = dir.join("calls.jsonl");
        let text: Vec<String> = records.iter().map(|r| r.to_line().unwrap()).collect();
        fs::write(&path, text.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_check_config_lists_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.yaml");
        fs::write(&path, CONFIG).unwrap();

        let out = check_config(&path).unwrap();
        assert!(out.contains("1. nvidia"));
        assert!(out.contains("2. mistral"));
        assert!(out.contains("disabled: tesseract"));
    }

    #[test]
    fn test_check_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, CONFIG.replace("timeout_ms: 5000", "timeout_ms: 0")).unwrap();
        assert!(check_config(&path).is_err());
    }

    #[test]
    fn test_report_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let at = millis_to_datetime(1_700_000_000_000);
        let log = write_log(
            dir.path(),
            &[
                CallRecord::success("nvidia", "ocr", Duration::from_millis(100), at),
                CallRecord::failure(
                    "mistral",
                    "ocr",
                    Duration::from_millis(300),
                    "boom",
                    FailureKind::ProviderError,
                    at,
                ),
            ],
        );

        let out = report(&log).unwrap();
        assert!(out.contains("- Total Calls: 2"));
        assert!(out.contains("- Error Rate: 50.0%"));
    }

    #[test]
    fn test_report_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = report(&dir.path().join("none.jsonl")).unwrap();
        assert!(out.contains("- Total Calls: 0"));
    }

    #[test]
    fn test_status_counts_current_window() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("tollgate.yaml");
        fs::write(&config_path, CONFIG).unwrap();

        let now = 1_700_000_030_000;
        let earlier = millis_to_datetime(now - 120_000);
        let current = millis_to_datetime(now - 1_000);
        let log = write_log(
            dir.path(),
            &[
                CallRecord::success("nvidia", "ocr", Duration::ZERO, earlier),
                CallRecord::success("nvidia", "ocr", Duration::ZERO, current),
                CallRecord::failure(
                    "nvidia",
                    "ocr",
                    Duration::ZERO,
                    "denied",
                    FailureKind::RateLimited,
                    current,
                ),
            ],
        );

        let out = status(&config_path, &log, now).unwrap();
        let line = out.lines().find(|l| l.starts_with("nvidia")).unwrap();
        assert!(line.contains("1/10"));
        assert!(line.ends_with("ok"));
        assert!(out.lines().any(|l| l.starts_with("tesseract") && l.ends_with("disabled")));
    }
}
