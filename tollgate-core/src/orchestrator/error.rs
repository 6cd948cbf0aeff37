//! Invocation and builder errors

use crate::calls::FailureKind;
use crate::config::ConfigError;
use crate::providers::error::ProviderError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why one provider attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    /// No admission slot within the attempt's time budget; no call was made
    #[error("rate limited: no slot within {waited:?}")]
    RateLimited { waited: Duration },

    /// The adapter call ran out of time
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    /// The adapter reported a failure
    #[error(transparent)]
    Call(ProviderError),

    /// The caller's deadline passed first
    #[error("cancelled by caller deadline")]
    Cancelled,
}

impl FailureCause {
    /// Whether another attempt against the same provider may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Call(err) => err.is_retryable(),
            Self::RateLimited { .. } | Self::Cancelled => false,
        }
    }

    /// Classification written to the call log
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Call(err) if err.is_timeout() => FailureKind::Timeout,
            Self::Call(_) => FailureKind::ProviderError,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Call(err) => Some(err),
            _ => None,
        }
    }
}

/// Last failure seen for one provider during an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    /// Adapter calls made against this provider
    pub attempts: u32,
    pub cause: FailureCause,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} attempts): {}",
            self.provider, self.attempts, self.cause
        )
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal outcome of a failed `invoke`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Every enabled provider failed; one entry per provider in priority order
    #[error("all {} providers exhausted: {}", .failures.len(), summarize(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    #[error("no enabled providers configured")]
    NoProviders,

    /// The caller's deadline passed; `failures` covers the providers tried so far
    #[error("deadline exceeded after trying {} providers", .failures.len())]
    DeadlineExceeded { failures: Vec<ProviderFailure> },
}

impl InvocationError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersExhausted { failures } | Self::DeadlineExceeded { failures } => {
                failures
            }
            Self::NoProviders => &[],
        }
    }
}

/// Misconfigured [`super::OrchestratorBuilder`] or reload
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a provider registry is required")]
    MissingRegistry,

    #[error("enabled provider '{provider}' has no adapter")]
    MissingAdapter { provider: String },

    #[error("failed to create adapter for '{provider}': {source}")]
    Adapter {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
