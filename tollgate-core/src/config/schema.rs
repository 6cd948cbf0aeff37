//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Schema versions this crate understands
pub const SUPPORTED_VERSION: &str = "1";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TollgateConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// What to do with invalid provider entries
    #[serde(default)]
    pub validation: ValidationMode,

    /// Call log settings
    #[serde(default)]
    pub log: LogConfig,

    /// Backoff between same-provider retries
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Error-rate circuit breaker settings
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Providers in declaration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// How per-provider validation failures are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Any invalid entry rejects the whole document
    #[default]
    Strict,
    /// Invalid entries are disabled, the rest load normally
    FailClosed,
}

/// One backend provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,

    /// Whether this provider takes part in invocations
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower values are tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Per-attempt time budget in milliseconds
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,

    /// Retries after the first attempt before falling back
    #[serde(alias = "maxRetries")]
    pub max_retries: u32,

    /// Admission window length in milliseconds
    #[serde(default = "default_window_size", alias = "windowSizeMs")]
    pub window_size_ms: u64,

    /// Calls admitted per window
    #[serde(default = "default_max_calls", alias = "maxCallsPerWindow")]
    pub max_calls_per_window: u32,

    /// How long an open circuit rejects calls, in milliseconds
    #[serde(default = "default_backoff", alias = "backoffMs")]
    pub backoff_ms: u64,

    /// Wire settings for the bundled HTTP adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointConfig>,
}

/// HTTP endpoint settings for [`crate::http::HttpAdapter`]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Base URL, e.g. `https://api.mistral.ai/v1`
    #[serde(alias = "baseUrl")]
    pub base_url: String,

    /// Path appended to the base URL
    #[serde(default = "default_path")]
    pub path: String,

    /// Bearer token (supports environment variable interpolation)
    #[serde(default, alias = "apiKey", skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Model identifier forwarded in the request body
    #[serde(default)]
    pub model: Option<String>,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Call log settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// JSONL file; records are kept in memory when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Error-rate trip settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitConfig {
    /// Errors within the window that open the circuit
    #[serde(default = "default_error_threshold", alias = "errorThreshold")]
    pub error_threshold: u32,

    /// Sliding window for counting errors, in milliseconds
    #[serde(default = "default_error_window", alias = "errorWindowMs")]
    pub error_window_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            error_window_ms: default_error_window(),
        }
    }
}

impl CircuitConfig {
    pub fn error_window(&self) -> Duration {
        Duration::from_millis(self.error_window_ms)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}
fn default_priority() -> u32 {
    100
}
fn default_window_size() -> u64 {
    60_000
}
fn default_max_calls() -> u32 {
    100
}
fn default_backoff() -> u64 {
    1_000
}
fn default_path() -> String {
    "/chat/completions".to_string()
}
fn default_error_threshold() -> u32 {
    3
}
fn default_error_window() -> u64 {
    60_000
}

impl TollgateConfig {
    /// Document-level checks: version, name uniqueness, circuit and retry bounds
    ///
    /// These are fatal regardless of [`ValidationMode`].
    pub fn validate_document(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != SUPPORTED_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::UnsupportedVersion {
                    supported: SUPPORTED_VERSION.to_string(),
                    found: self.version.clone(),
                },
            ));
        }

        let mut seen_names = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen_names.insert(provider.name.as_str()) {
                return Err(ValidationError::new(
                    format!("providers[{}].name", i),
                    ValidationErrorKind::DuplicateProvider {
                        name: provider.name.clone(),
                    },
                ));
            }
        }

        if self.circuit.error_threshold == 0 {
            return Err(ValidationError::out_of_range(
                "circuit.error_threshold",
                "Must be greater than 0",
            ));
        }

        if self.circuit.error_window_ms == 0 {
            return Err(ValidationError::out_of_range(
                "circuit.error_window_ms",
                "Must be greater than 0",
            ));
        }

        self.validate_retry()
    }

    fn validate_retry(&self) -> Result<(), ValidationError> {
        let retry = &self.retry;
        if !retry.exponential_base.is_finite() || retry.exponential_base < 1.0 {
            return Err(ValidationError::out_of_range(
                "retry.exponential_base",
                "Must be a finite number of at least 1.0",
            )
            .with_context(format!("got {}", retry.exponential_base)));
        }

        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ValidationError::out_of_range(
                "retry.jitter_factor",
                "Must be between 0.0 and 1.0",
            )
            .with_context(format!("got {}", retry.jitter_factor)));
        }

        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(ValidationError::out_of_range(
                "retry.initial_delay_ms",
                "Must not exceed retry.max_delay_ms",
            )
            .with_context(format!(
                "{} > {}",
                retry.initial_delay_ms, retry.max_delay_ms
            )));
        }

        Ok(())
    }
}

impl ProviderConfig {
    /// Create a provider entry with default limits
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority,
            timeout_ms: 30_000,
            max_retries: 0,
            window_size_ms: default_window_size(),
            max_calls_per_window: default_max_calls(),
            backoff_ms: default_backoff(),
            endpoint: None,
        }
    }

    /// Validate one provider entry
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required(format!("{}.name", path)));
        }

        if self.timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.window_size_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.window_size_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.max_calls_per_window == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_calls_per_window", path),
                "Must be greater than 0",
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            endpoint.validate(&format!("{}.endpoint", path))?;
        }

        Ok(())
    }
}

impl EndpointConfig {
    /// Validate endpoint settings
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::required(format!("{}.base_url", path)));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: format!(
                                "URL scheme must be http or https, got: {}",
                                url.scheme()
                            ),
                        },
                    ));
                }
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{}.base_url", path),
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                ));
            }
        }

        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(ValidationError::invalid_format(
                format!("{}.path", path),
                "Must start with '/'",
            ));
        }

        Ok(())
    }

    /// Full request URL
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }
}
