//! Per-provider admission control
//!
//! [`RateLimiterState`] combines a fixed-window call counter with a
//! [`CircuitBreaker`] for every configured provider. One instance is built
//! per process and shared (`Arc`) by every orchestrator call.
//!
//! Each provider's window and breaker live in one [`DashMap`] entry, and a
//! check holds that entry's shard lock from read to write, so concurrent
//! checks cannot over-admit or lose increments. Checks for different
//! providers never wait on each other's sleeps.

pub mod circuit;

pub use circuit::{CircuitBreaker, CircuitState, CircuitStatus};

use crate::clock::Clock;
use crate::config::CircuitConfig;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Admission limits for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub window_size: Duration,
    pub max_calls: u32,
    /// How long the circuit stays open once tripped
    pub backoff: Duration,
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Circuit is open; try again after `retry_in`
    CircuitOpen { retry_in: Duration },
    /// This check hit the window cap and opened the circuit
    WindowExhausted { retry_in: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Snapshot of one provider's admission state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub current: u32,
    pub max: u32,
    pub usage_percent: f64,
    pub circuit: CircuitStatus,
    pub recent_errors: usize,
}

/// Counter for the current window bucket (`now_ms / window_size_ms`)
#[derive(Debug, Clone, Copy, Default)]
struct Window {
    bucket: u64,
    count: u32,
}

#[derive(Debug, Default)]
struct ProviderGate {
    window: Window,
    breaker: CircuitBreaker,
}

/// Shared rate-limit and circuit state for all providers
pub struct RateLimiterState {
    clock: Arc<dyn Clock>,
    limits: ArcSwap<HashMap<String, RateLimit>>,
    circuit: CircuitConfig,
    gates: DashMap<String, ProviderGate>,
}

impl RateLimiterState {
    pub fn new(
        limits: HashMap<String, RateLimit>,
        circuit: CircuitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clock,
            limits: ArcSwap::from_pointee(limits),
            circuit,
            gates: DashMap::new(),
        }
    }

    /// Limits for `provider`, if configured
    pub fn limit(&self, provider: &str) -> Option<RateLimit> {
        self.limits.load().get(provider).copied()
    }

    /// Replace the limits table, keeping live counters and breakers
    pub fn set_limits(&self, limits: HashMap<String, RateLimit>) {
        self.limits.store(Arc::new(limits));
    }

    /// Decide whether a call to `provider` may start now
    ///
    /// Unconfigured providers are always admitted.
    pub fn check_admission(&self, provider: &str) -> Admission {
        let Some(limit) = self.limit(provider) else {
            return Admission::Admitted;
        };

        let now = self.clock.now_ms();
        let bucket = now / (limit.window_size.as_millis() as u64).max(1);

        let mut gate = match self.gates.get_mut(provider) {
            Some(gate) => gate,
            None => self.gates.entry(provider.to_string()).or_default(),
        };

        if let Some(retry_in) = gate.breaker.poll(now, limit.backoff) {
            return Admission::CircuitOpen { retry_in };
        }

        if gate.window.bucket != bucket {
            gate.window = Window { bucket, count: 0 };
        }

        if gate.window.count >= limit.max_calls {
            gate.breaker.trip(now);
            warn!(
                provider,
                max = limit.max_calls,
                "rate limit hit, circuit opened"
            );
            return Admission::WindowExhausted {
                retry_in: limit.backoff,
            };
        }

        gate.window.count += 1;
        Admission::Admitted
    }

    /// Wait until `provider` is admitted
    ///
    /// Sleeps for the provider's backoff between checks and never gives up;
    /// wrap it in a timeout to bound the wait.
    pub async fn await_admission(&self, provider: &str) {
        loop {
            if self.check_admission(provider).is_admitted() {
                return;
            }
            let backoff = self
                .limit(provider)
                .map(|l| l.backoff)
                .unwrap_or_default()
                .max(Duration::from_millis(1));
            debug!(provider, ?backoff, "waiting for rate limit slot");
            tokio::time::sleep(backoff).await;
        }
    }

    /// Feed a successful call into the breaker
    pub fn observe_success(&self, provider: &str) {
        if let Some(mut gate) = self.gates.get_mut(provider) {
            gate.breaker.on_success();
        }
    }

    /// Feed a failed call into the breaker; returns true if it tripped
    pub fn observe_failure(&self, provider: &str) -> bool {
        if self.limit(provider).is_none() {
            return false;
        }
        let now = self.clock.now_ms();
        let mut gate = self.gates.entry(provider.to_string()).or_default();
        let tripped = gate.breaker.on_failure(now, &self.circuit);
        if tripped {
            warn!(
                provider,
                threshold = self.circuit.error_threshold,
                window_ms = self.circuit.error_window_ms,
                "error threshold reached, circuit opened"
            );
        }
        tripped
    }

    /// Current window usage and circuit status
    pub fn stats(&self, provider: &str) -> Option<WindowStats> {
        let limit = self.limit(provider)?;
        let now = self.clock.now_ms();
        let bucket = now / (limit.window_size.as_millis() as u64).max(1);

        let (current, circuit, recent_errors) = match self.gates.get(provider) {
            Some(gate) => (
                if gate.window.bucket == bucket {
                    gate.window.count
                } else {
                    0
                },
                gate.breaker.status(now, limit.backoff),
                gate.breaker
                    .recent_errors(now, self.circuit.error_window_ms),
            ),
            None => (0, CircuitStatus::Closed, 0),
        };

        Some(WindowStats {
            current,
            max: limit.max_calls,
            usage_percent: f64::from(current) / f64::from(limit.max_calls.max(1)) * 100.0,
            circuit,
            recent_errors,
        })
    }

    /// Raw breaker state, `Closed` for providers never seen
    pub fn circuit_state(&self, provider: &str) -> CircuitState {
        self.gates
            .get(provider)
            .map(|gate| gate.breaker.state())
            .unwrap_or_default()
    }

    /// Forget counters and breaker state for one provider
    pub fn reset(&self, provider: &str) {
        self.gates.remove(provider);
    }

    /// Forget all counters and breaker state
    pub fn reset_all(&self) {
        self.gates.clear();
    }
}
