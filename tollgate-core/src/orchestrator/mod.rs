//! Invocation orchestrator
//!
//! [`Orchestrator::invoke`] walks the enabled providers in priority order.
//! For each one it waits for an admission slot, calls the adapter under a
//! timeout, records the outcome and feeds it to the circuit breaker, then
//! either returns, retries the same provider, or falls back to the next.

mod builder;
mod error;

pub use builder::OrchestratorBuilder;
pub use error::{BuildError, FailureCause, InvocationError, ProviderFailure};

use crate::calls::{CallLogger, CallRecord};
use crate::clock::Clock;
use crate::limiter::{RateLimiterState, WindowStats};
use crate::providers::{AdapterRequest, ProviderAdapter, ProviderRegistry, ProviderSpec, RetryPolicy};
use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Successful invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Adapter output, untouched
    pub output: Value,

    /// Which provider ultimately succeeded
    pub provider_used: String,

    /// Whether a provider other than the first enabled one answered
    pub used_fallback: bool,

    /// Adapter calls made across all providers
    pub attempts: u32,

    pub invocation_id: Uuid,

    /// Providers that failed before `provider_used`, in the order tried
    pub provider_errors: Vec<ProviderFailure>,
}

/// Operator view of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    pub has_adapter: bool,
    /// `None` when the limiter has no limits for the provider
    pub window: Option<WindowStats>,
}

pub struct Orchestrator {
    registry: ArcSwap<ProviderRegistry>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    limiter: Arc<RateLimiterState>,
    logger: Arc<CallLogger>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

enum ProviderOutcome {
    Success { output: Value, attempts: u32 },
    Failed(ProviderFailure),
    DeadlineExceeded(ProviderFailure),
}

/// Per-invocation context shared by every attempt
struct Call<'a> {
    operation: &'a str,
    payload: &'a Value,
    invocation_id: Uuid,
    deadline: Option<Instant>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Run `operation` against the best available provider
    pub async fn invoke(
        &self,
        operation: &str,
        payload: Value,
    ) -> Result<Invocation, InvocationError> {
        self.run(operation, payload, None).await
    }

    /// Like [`Orchestrator::invoke`], but gives up once `deadline` passes
    ///
    /// The deadline bounds admission waits, adapter calls and retry sleeps.
    /// An adapter call still running at the deadline is dropped and logged
    /// as `cancelled`.
    pub async fn invoke_with_deadline(
        &self,
        operation: &str,
        payload: Value,
        deadline: Instant,
    ) -> Result<Invocation, InvocationError> {
        self.run(operation, payload, Some(deadline)).await
    }

    async fn run(
        &self,
        operation: &str,
        payload: Value,
        deadline: Option<Instant>,
    ) -> Result<Invocation, InvocationError> {
        // in-flight invocations keep the registry they started with
        let registry = self.registry.load_full();
        let call = Call {
            operation,
            payload: &payload,
            invocation_id: Uuid::new_v4(),
            deadline,
        };

        let mut failures = Vec::new();
        let mut attempts = 0;
        let mut tried_any = false;

        for spec in registry.enabled() {
            let Some(adapter) = self.adapters.get(&spec.name) else {
                warn!(provider = %spec.name, "no adapter attached, skipping");
                continue;
            };
            tried_any = true;

            match self.try_provider(spec, adapter.as_ref(), &call).await {
                ProviderOutcome::Success {
                    output,
                    attempts: used,
                } => {
                    attempts += used;
                    info!(
                        provider = %spec.name,
                        operation,
                        invocation_id = %call.invocation_id,
                        attempts,
                        fallback = !failures.is_empty(),
                        "invocation succeeded"
                    );
                    return Ok(Invocation {
                        output,
                        provider_used: spec.name.clone(),
                        used_fallback: !failures.is_empty(),
                        attempts,
                        invocation_id: call.invocation_id,
                        provider_errors: failures,
                    });
                }
                ProviderOutcome::Failed(failure) => {
                    attempts += failure.attempts;
                    warn!(
                        provider = %failure.provider,
                        invocation_id = %call.invocation_id,
                        cause = %failure.cause,
                        "provider failed, falling back"
                    );
                    failures.push(failure);
                }
                ProviderOutcome::DeadlineExceeded(failure) => {
                    failures.push(failure);
                    warn!(operation, invocation_id = %call.invocation_id, "invocation deadline exceeded");
                    return Err(InvocationError::DeadlineExceeded { failures });
                }
            }
        }

        if !tried_any {
            return Err(InvocationError::NoProviders);
        }
        warn!(operation, invocation_id = %call.invocation_id, "all providers exhausted");
        Err(InvocationError::AllProvidersExhausted { failures })
    }

    /// Attempt one provider, retrying per its `max_retries`
    async fn try_provider(
        &self,
        spec: &ProviderSpec,
        adapter: &dyn ProviderAdapter,
        call: &Call<'_>,
    ) -> ProviderOutcome {
        let name = spec.name.as_str();
        let mut calls = 0;
        let mut attempt = 0;

        loop {
            let started = Instant::now();
            if call.deadline.is_some_and(|d| started >= d) {
                return ProviderOutcome::DeadlineExceeded(failure(name, calls, FailureCause::Cancelled));
            }

            // the provider timeout covers both the admission wait and the call
            let attempt_deadline = started + spec.timeout;
            let (bound, cut_by_deadline) = match call.deadline {
                Some(d) if d <= attempt_deadline => (d, true),
                _ => (attempt_deadline, false),
            };

            if timeout_at(bound, self.limiter.await_admission(name))
                .await
                .is_err()
            {
                if cut_by_deadline {
                    debug!(provider = name, "deadline passed while waiting for admission");
                    return ProviderOutcome::DeadlineExceeded(failure(
                        name,
                        calls,
                        FailureCause::Cancelled,
                    ));
                }
                let waited = started.elapsed();
                let cause = FailureCause::RateLimited { waited };
                self.record_failure(name, call, waited, &cause);
                return ProviderOutcome::Failed(failure(name, calls, cause));
            }

            let timeout = bound.saturating_duration_since(Instant::now());
            let request = AdapterRequest {
                operation: call.operation,
                payload: call.payload,
                timeout,
                invocation_id: call.invocation_id,
                attempt,
            };

            calls += 1;
            let call_started = Instant::now();
            let result = timeout_at(bound, adapter.call(request)).await;
            let elapsed = call_started.elapsed();

            let cause = match result {
                Ok(Ok(output)) => {
                    self.logger.record_entry(
                        CallRecord::success(name, call.operation, elapsed, self.clock.now())
                            .with_invocation(call.invocation_id),
                    );
                    self.limiter.observe_success(name);
                    return ProviderOutcome::Success {
                        output,
                        attempts: calls,
                    };
                }
                Ok(Err(err)) => FailureCause::Call(err),
                Err(_) if cut_by_deadline => {
                    let cause = FailureCause::Cancelled;
                    self.record_failure(name, call, elapsed, &cause);
                    return ProviderOutcome::DeadlineExceeded(failure(name, calls, cause));
                }
                Err(_) => FailureCause::Timeout { after: timeout },
            };

            self.record_failure(name, call, elapsed, &cause);
            self.limiter.observe_failure(name);

            if !cause.is_retryable() {
                if attempt < spec.max_retries {
                    debug!(provider = name, cause = %cause, "non-retryable error, skipping retries");
                }
                return ProviderOutcome::Failed(failure(name, calls, cause));
            }
            if attempt >= spec.max_retries {
                return ProviderOutcome::Failed(failure(name, calls, cause));
            }

            let delay = self.retry.calculate_delay(attempt, cause.provider_error());
            if call.deadline.is_some_and(|d| Instant::now() + delay >= d) {
                // the retry would start past the deadline
                return ProviderOutcome::DeadlineExceeded(failure(name, calls, cause));
            }
            debug!(provider = name, attempt, ?delay, "retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn record_failure(&self, provider: &str, call: &Call<'_>, duration: Duration, cause: &FailureCause) {
        let kind = cause.kind();
        if kind.counts_toward_circuit() {
            debug!(provider, ?kind, cause = %cause, "attempt failed");
        }
        let record = CallRecord::failure(
            provider,
            call.operation,
            duration,
            cause.to_string(),
            kind,
            self.clock.now(),
        )
        .with_invocation(call.invocation_id);
        self.logger.record_entry(record);
    }

    /// Swap in a new registry
    ///
    /// Invocations already running finish against the registry they loaded.
    /// Live window counters and breakers are kept for providers that remain.
    pub fn reload(&self, registry: ProviderRegistry) -> Result<(), BuildError> {
        builder::check_adapters(&registry, &self.adapters)?;
        self.limiter.set_limits(registry.rate_limits());
        info!(providers = registry.len(), "provider registry reloaded");
        self.registry.store(Arc::new(registry));
        Ok(())
    }

    /// Name, priority and admission state of every provider
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.registry
            .load()
            .all()
            .iter()
            .map(|spec| ProviderStatus {
                name: spec.name.clone(),
                enabled: spec.enabled,
                priority: spec.priority,
                has_adapter: self.adapters.contains_key(&spec.name),
                window: self.limiter.stats(&spec.name),
            })
            .collect()
    }

    pub fn registry(&self) -> Arc<ProviderRegistry> {
        self.registry.load_full()
    }

    pub fn limiter(&self) -> &Arc<RateLimiterState> {
        &self.limiter
    }

    pub fn logger(&self) -> &Arc<CallLogger> {
        &self.logger
    }
}

fn failure(provider: &str, attempts: u32, cause: FailureCause) -> ProviderFailure {
    ProviderFailure {
        provider: provider.to_string(),
        attempts,
        cause,
    }
}
