//! Call records: one immutable line per attempted provider call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Success => write!(f, "success"),
            CallStatus::Error => write!(f, "error"),
        }
    }
}

/// Why an `error` record failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Never admitted within the provider's timeout; no call was made
    RateLimited,
    /// The adapter call exceeded its time budget
    Timeout,
    /// The caller's deadline cut the call short
    Cancelled,
    /// The adapter reported a failure
    ProviderError,
}

impl FailureKind {
    /// Whether a failure of this kind counts toward the error-rate trip
    pub fn counts_toward_circuit(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::ProviderError)
    }
}

/// Log entry; serialized as a single JSON object per line
///
/// `server` is accepted in place of `provider` when reading older logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "server")]
    pub provider: String,
    pub method: String,
    /// Milliseconds
    pub duration: u64,
    pub status: CallStatus,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<Uuid>,
}

impl CallRecord {
    pub fn success(
        provider: impl Into<String>,
        method: impl Into<String>,
        duration: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            provider: provider.into(),
            method: method.into(),
            duration: duration.as_millis() as u64,
            status: CallStatus::Success,
            error: None,
            kind: None,
            invocation_id: None,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        method: impl Into<String>,
        duration: Duration,
        error: impl Into<String>,
        kind: FailureKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            provider: provider.into(),
            method: method.into(),
            duration: duration.as_millis() as u64,
            status: CallStatus::Error,
            error: Some(error.into()),
            kind: Some(kind),
            invocation_id: None,
        }
    }

    pub fn with_invocation(mut self, id: Uuid) -> Self {
        self.invocation_id = Some(id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == CallStatus::Error
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Serialize to one log line (without the trailing newline)
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
