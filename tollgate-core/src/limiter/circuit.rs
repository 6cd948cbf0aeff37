//! Per-provider circuit breaker
//!
//! # States
//! ```text
//! Closed   → Open:     window cap hit, or error_threshold errors within error_window
//! Open     → HalfOpen: first admission check after `backoff` has elapsed
//! HalfOpen → Closed:   a call succeeds
//! HalfOpen → Open:     a call fails
//! ```
//!
//! There is no timer: expiry is evaluated lazily by [`CircuitBreaker::poll`].
//! Half-open admits every caller, not a single probe.

use crate::config::CircuitConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Breaker state; `opened_at_ms` is epoch milliseconds of the trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open { opened_at_ms: u64 },
    HalfOpen,
}

/// State as reported to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitStatus::Closed => write!(f, "closed"),
            CircuitStatus::Open => write!(f, "open"),
            CircuitStatus::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    state: CircuitState,
    /// Failure timestamps inside the trailing error window, oldest first
    errors: VecDeque<u64>,
}

impl CircuitBreaker {
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Status at `now` without changing state
    pub fn status(&self, now_ms: u64, backoff: Duration) -> CircuitStatus {
        match self.state {
            CircuitState::Closed => CircuitStatus::Closed,
            CircuitState::HalfOpen => CircuitStatus::HalfOpen,
            CircuitState::Open { opened_at_ms } => {
                if now_ms.saturating_sub(opened_at_ms) < backoff.as_millis() as u64 {
                    CircuitStatus::Open
                } else {
                    CircuitStatus::HalfOpen
                }
            }
        }
    }

    /// Admission gate: `Some(remaining)` while the backoff is running
    ///
    /// An expired open circuit moves to half-open here.
    pub fn poll(&mut self, now_ms: u64, backoff: Duration) -> Option<Duration> {
        if let CircuitState::Open { opened_at_ms } = self.state {
            let elapsed = now_ms.saturating_sub(opened_at_ms);
            let backoff_ms = backoff.as_millis() as u64;
            if elapsed < backoff_ms {
                return Some(Duration::from_millis(backoff_ms - elapsed));
            }
            self.state = CircuitState::HalfOpen;
        }
        None
    }

    /// Open at `at_ms` (re-opening restarts the backoff)
    pub fn trip(&mut self, at_ms: u64) {
        self.state = CircuitState::Open { opened_at_ms: at_ms };
    }

    pub fn on_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            self.errors.clear();
        }
    }

    /// Record a failure at `at_ms`; returns true if this failure opened the circuit
    pub fn on_failure(&mut self, at_ms: u64, settings: &CircuitConfig) -> bool {
        self.errors.push_back(at_ms);
        self.prune(at_ms, settings.error_window_ms);

        match self.state {
            CircuitState::HalfOpen => {
                self.trip(at_ms);
                true
            }
            CircuitState::Closed if self.errors.len() >= settings.error_threshold as usize => {
                self.trip(at_ms);
                true
            }
            _ => false,
        }
    }

    /// Errors within the trailing window ending at `now_ms`
    pub fn recent_errors(&self, now_ms: u64, window_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(window_ms);
        self.errors.iter().filter(|&&t| t >= cutoff).count()
    }

    fn prune(&mut self, now_ms: u64, window_ms: u64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        while self.errors.front().is_some_and(|&t| t < cutoff) {
            self.errors.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKOFF: Duration = Duration::from_secs(2);

    fn settings() -> CircuitConfig {
        CircuitConfig {
            error_threshold: 3,
            error_window_ms: 60_000,
        }
    }

    #[test]
    fn test_trips_on_third_error_in_window() {
        let mut breaker = CircuitBreaker::default();
        assert!(!breaker.on_failure(1_000, &settings()));
        assert!(!breaker.on_failure(2_000, &settings()));
        assert!(breaker.on_failure(3_000, &settings()));
        assert_eq!(breaker.state(), CircuitState::Open { opened_at_ms: 3_000 });
    }

    #[test]
    fn test_old_errors_fall_out_of_window() {
        let mut breaker = CircuitBreaker::default();
        breaker.on_failure(0, &settings());
        breaker.on_failure(1_000, &settings());
        // first two are older than 60s by now
        assert!(!breaker.on_failure(62_000, &settings()));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.recent_errors(62_000, 60_000), 1);
    }

    #[test]
    fn test_open_until_backoff_then_half_open() {
        let mut breaker = CircuitBreaker::default();
        breaker.trip(10_000);

        assert_eq!(breaker.poll(10_500, BACKOFF), Some(Duration::from_millis(1_500)));
        assert_eq!(breaker.status(11_999, BACKOFF), CircuitStatus::Open);
        assert_eq!(breaker.poll(12_000, BACKOFF), None);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes_and_forgets_errors() {
        let mut breaker = CircuitBreaker::default();
        for t in [1, 2, 3] {
            breaker.on_failure(t, &settings());
        }
        breaker.poll(10_000, BACKOFF);
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.recent_errors(10_000, 60_000), 0);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let mut breaker = CircuitBreaker::default();
        breaker.trip(0);
        breaker.poll(5_000, BACKOFF);
        assert!(breaker.on_failure(5_100, &settings()));
        assert_eq!(breaker.state(), CircuitState::Open { opened_at_ms: 5_100 });
    }

    #[test]
    fn test_success_while_closed_keeps_error_history() {
        let mut breaker = CircuitBreaker::default();
        breaker.on_failure(1_000, &settings());
        breaker.on_success();
        assert_eq!(breaker.recent_errors(1_000, 60_000), 1);
    }
}
