//! Append-only storage for call records

use super::record::CallRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Durable, append-only record store
///
/// `append` must be safe to call from many threads at once without
/// interleaving lines. `read_all` must tolerate partially written data.
pub trait CallSink: Send + Sync {
    fn append(&self, record: &CallRecord) -> io::Result<()>;

    fn read_all(&self) -> io::Result<Vec<CallRecord>>;
}

/// Parse JSONL bytes, skipping blank, truncated or malformed lines
///
/// Lines are decoded one at a time, so invalid UTF-8 (a tail torn inside a
/// multi-byte character) only loses the line it sits on.
pub fn parse_lines(bytes: &[u8]) -> Vec<CallRecord> {
    bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
        .filter_map(|line| match serde_json::from_slice::<CallRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping unreadable call log line");
                None
            }
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// JSON-lines file opened in append mode
///
/// Writers are serialized by a lock and each line goes out in a single
/// `write_all`, so concurrent records never interleave.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlFileSink {
    /// The file and its parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl CallSink for JsonlFileSink {
    fn append(&self, record: &CallRecord) -> io::Result<()> {
        let mut line = record.to_line().map_err(io::Error::other)?;
        line.push('\n');

        let mut guard = lock(&self.file);
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                // reopen on the next append
                *guard = None;
                return Err(e);
            }
        }
        Ok(())
    }

    fn read_all(&self) -> io::Result<Vec<CallRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(parse_lines(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// In-process sink keeping the serialized lines
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line written so far
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallSink for MemorySink {
    fn append(&self, record: &CallRecord) -> io::Result<()> {
        let line = record.to_line().map_err(io::Error::other)?;
        lock(&self.lines).push(line);
        Ok(())
    }

    fn read_all(&self) -> io::Result<Vec<CallRecord>> {
        Ok(parse_lines(lock(&self.lines).join("\n").as_bytes()))
    }
}
