//! Backoff policy for same-provider retries
//!
//! How many times a provider is retried comes from its own `max_retries`;
//! this policy only decides how long to wait between those attempts.

use crate::providers::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff between retries of the same provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_delay", alias = "initialDelayMs")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    #[serde(default = "default_max_delay", alias = "maxDelayMs")]
    pub max_delay_ms: u64,

    /// Growth factor per retry (2.0 doubles each time)
    #[serde(default = "default_exponential_base", alias = "exponentialBase")]
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) applied symmetrically around the delay
    #[serde(default = "default_jitter", alias = "jitterFactor")]
    pub jitter_factor: f64,

    /// Use a provider's `retry_after` hint when it is shorter than `max_delay_ms`
    #[serde(default = "default_true", alias = "respectRetryAfter")]
    pub respect_retry_after: bool,
}

fn default_initial_delay() -> u64 {
    100
}
fn default_max_delay() -> u64 {
    2_000
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            exponential_base: default_exponential_base(),
            jitter_factor: default_jitter(),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with fixed, jitter-free delays; handy for tests
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            exponential_base: 1.0,
            jitter_factor: 0.0,
            respect_retry_after: false,
        }
    }

    /// Delay before retry number `attempt` (0-based) after `error`
    pub fn calculate_delay(&self, attempt: u32, error: Option<&ProviderError>) -> Duration {
        if self.respect_retry_after {
            if let Some(hint) = error.and_then(ProviderError::retry_delay) {
                return hint.min(Duration::from_millis(self.max_delay_ms));
            }
        }

        let base_delay =
            self.initial_delay_ms as f64 * self.exponential_base.powi(attempt.min(31) as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64).max(0.0);

        // a negative or NaN factor disables jitter; the range must stay non-empty
        let jitter_factor = self.jitter_factor.min(1.0);
        let delay_with_jitter = if jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }
}
