//! End-to-end invocation: admission, retry, fallback, deadlines and logging
//!
//! Every test runs on a paused tokio clock; the call log timestamps follow it
//! through `SystemClock`, so backoffs and timeouts finish instantly.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tollgate_core::calls::{CallLogger, CallRecord, CallSink, CallStatus, FailureKind, MemorySink};
use tollgate_core::clock::{Clock, SystemClock};
use tollgate_core::config::ProviderConfig;
use tollgate_core::providers::RetryPolicy;
use tollgate_core::{
    AdapterRequest, BuildError, FailureCause, InvocationError, Orchestrator, ProviderAdapter,
    ProviderError, ProviderRegistry,
};

#[derive(Clone)]
enum Step {
    Reply(Value),
    Fail(ProviderError),
    Slow(Duration, Value),
    Hang,
}

/// Adapter that plays back a script, then repeats `then` forever
struct ScriptedAdapter {
    name: String,
    script: Mutex<VecDeque<Step>>,
    then: Step,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    fn new(name: &str, script: Vec<Step>, then: Step) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            then,
            calls: AtomicU32::new(0),
        })
    }

    fn always(name: &str, step: Step) -> Arc<Self> {
        Self::new(name, Vec::new(), step)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _request: AdapterRequest<'_>) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.then.clone());
        match step {
            Step::Reply(value) => Ok(value),
            Step::Fail(err) => Err(err),
            Step::Slow(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Step::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn server_error() -> ProviderError {
    ProviderError::ServerError {
        status_code: 503,
        message: "overloaded".into(),
    }
}

fn provider(name: &str, priority: u32, max_retries: u32) -> ProviderConfig {
    let mut config = ProviderConfig::new(name, priority);
    config.max_retries = max_retries;
    config.timeout_ms = 1_000;
    config.backoff_ms = 60_000;
    config
}

struct Harness {
    orchestrator: Orchestrator,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new(providers: Vec<ProviderConfig>, adapters: Vec<Arc<ScriptedAdapter>>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let sink = Arc::new(MemorySink::new());
        let logger = Arc::new(CallLogger::new(sink.clone(), Arc::clone(&clock)));

        let mut builder = Orchestrator::builder()
            .registry(ProviderRegistry::from_providers(providers).unwrap())
            .logger(logger)
            .clock(clock)
            .retry_policy(RetryPolicy::fixed(Duration::from_millis(10)));
        for adapter in adapters {
            let name = adapter.name.clone();
            builder = builder.shared_adapter(name, adapter);
        }

        Self {
            orchestrator: builder.build().unwrap(),
            sink,
        }
    }

    fn records(&self) -> Vec<CallRecord> {
        self.sink.read_all().unwrap()
    }

    fn summary(&self) -> Vec<(String, CallStatus, Option<FailureKind>)> {
        self.records()
            .into_iter()
            .map(|r| (r.provider, r.status, r.kind))
            .collect()
    }
}

fn row(provider: &str, status: CallStatus, kind: Option<FailureKind>) -> (String, CallStatus, Option<FailureKind>) {
    (provider.to_string(), status, kind)
}

#[tokio::test(start_paused = true)]
async fn test_primary_success_no_fallback() {
    let a = ScriptedAdapter::always("a", Step::Reply(json!({"total": 42})));
    let b = ScriptedAdapter::always("b", Step::Reply(json!({})));
    let harness = Harness::new(vec![provider("a", 1, 2), provider("b", 2, 0)], vec![a.clone(), b.clone()]);

    let result = harness
        .orchestrator
        .invoke("extract_invoice", json!({"doc": 1}))
        .await
        .unwrap();

    assert_eq!(result.output["total"], 42);
    assert_eq!(result.provider_used, "a");
    assert!(!result.used_fallback);
    assert_eq!(result.attempts, 1);
    assert!(result.provider_errors.is_empty());
    assert_eq!(b.calls(), 0);

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].method, "extract_invoice");
    assert_eq!(records[0].invocation_id, Some(result.invocation_id));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_after_retries_exhausted() {
    let a = ScriptedAdapter::always("a", Step::Fail(server_error()));
    let b = ScriptedAdapter::always("b", Step::Reply(json!("from b")));
    let harness = Harness::new(vec![provider("a", 1, 1), provider("b", 2, 0)], vec![a.clone(), b.clone()]);

    let result = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();

    assert_eq!(result.provider_used, "b");
    assert!(result.used_fallback);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.provider_errors.len(), 1);
    assert_eq!(result.provider_errors[0].provider, "a");
    assert_eq!(result.provider_errors[0].attempts, 2);
    assert_eq!(a.calls(), 2);

    assert_eq!(
        harness.summary(),
        vec![
            row("a", CallStatus::Error, Some(FailureKind::ProviderError)),
            row("a", CallStatus::Error, Some(FailureKind::ProviderError)),
            row("b", CallStatus::Success, None),
        ]
    );
    let ids: HashSet<_> = harness.records().iter().map(|r| r.invocation_id).collect();
    assert_eq!(ids.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_falls_back_without_calling_provider() {
    let a = ScriptedAdapter::always("a", Step::Fail(server_error()));
    let b = ScriptedAdapter::always("b", Step::Reply(json!("ok")));
    let mut slow_to_admit = provider("a", 1, 2);
    slow_to_admit.timeout_ms = 100;
    let harness = Harness::new(vec![slow_to_admit, provider("b", 2, 0)], vec![a.clone(), b.clone()]);

    // three failures trip a's breaker
    let first = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();
    assert_eq!(first.provider_used, "b");
    assert_eq!(a.calls(), 3);

    let second = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();
    assert_eq!(second.provider_used, "b");
    assert_eq!(a.calls(), 3);
    assert!(matches!(
        second.provider_errors[0].cause,
        FailureCause::RateLimited { .. }
    ));
    assert_eq!(second.provider_errors[0].attempts, 0);

    let second_records: Vec<_> = harness
        .records()
        .into_iter()
        .filter(|r| r.invocation_id == Some(second.invocation_id))
        .map(|r| (r.provider, r.status, r.kind))
        .collect();
    assert_eq!(
        second_records,
        vec![
            row("a", CallStatus::Error, Some(FailureKind::RateLimited)),
            row("b", CallStatus::Success, None),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_each_provider_in_priority_order() {
    let a = ScriptedAdapter::always("a", Step::Fail(server_error()));
    let b = ScriptedAdapter::always("b", Step::Fail(ProviderError::Network {
        message: "reset".into(),
    }));
    let c = ScriptedAdapter::always("c", Step::Fail(ProviderError::NotFound {
        message: "no model".into(),
    }));
    // declared out of order on purpose
    let harness = Harness::new(
        vec![provider("c", 3, 0), provider("a", 1, 0), provider("b", 2, 1)],
        vec![a, b, c],
    );

    let err = harness.orchestrator.invoke("ocr", json!({})).await.unwrap_err();
    let InvocationError::AllProvidersExhausted { failures } = &err else {
        panic!("unexpected {err:?}");
    };

    let order: Vec<&str> = failures.iter().map(|f| f.provider.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(failures[1].attempts, 2);
    assert_eq!(
        failures[2].cause,
        FailureCause::Call(ProviderError::NotFound {
            message: "no model".into()
        })
    );
    assert_eq!(harness.records().len(), 4);
    assert!(harness.records().iter().all(CallRecord::is_error));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_skips_remaining_retries() {
    let a = ScriptedAdapter::always("a", Step::Fail(ProviderError::Authentication {
        message: "401".into(),
    }));
    let b = ScriptedAdapter::always("b", Step::Reply(json!("ok")));
    let harness = Harness::new(vec![provider("a", 1, 3), provider("b", 2, 0)], vec![a.clone(), b]);

    let result = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();
    assert_eq!(a.calls(), 1);
    assert_eq!(result.provider_used, "b");
    assert_eq!(result.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_success_on_same_provider() {
    let a = ScriptedAdapter::new(
        "a",
        vec![Step::Fail(server_error()), Step::Fail(server_error())],
        Step::Reply(json!("third time")),
    );
    let harness = Harness::new(vec![provider("a", 1, 2)], vec![a.clone()]);

    let start = tokio::time::Instant::now();
    let result = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();

    assert_eq!(result.provider_used, "a");
    assert!(!result.used_fallback);
    assert_eq!(result.attempts, 3);
    // two fixed 10ms backoffs
    assert!(start.elapsed() >= Duration::from_millis(20));

    let records = harness.records();
    assert_eq!(records.iter().filter(|r| r.is_error()).count(), 2);
    assert_eq!(records.iter().filter(|r| !r.is_error()).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out_and_falls_back() {
    let a = ScriptedAdapter::always("a", Step::Slow(Duration::from_secs(5), json!("late")));
    let b = ScriptedAdapter::always("b", Step::Reply(json!("ok")));
    let mut slow = provider("a", 1, 0);
    slow.timeout_ms = 200;
    let harness = Harness::new(vec![slow, provider("b", 2, 0)], vec![a, b]);

    let result = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();
    assert_eq!(result.provider_used, "b");
    assert!(matches!(
        result.provider_errors[0].cause,
        FailureCause::Timeout { .. }
    ));

    let records = harness.records();
    assert_eq!(records[0].kind, Some(FailureKind::Timeout));
    assert!(records[0].duration >= 200);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_in_flight_call() {
    let a = ScriptedAdapter::always("a", Step::Hang);
    let b = ScriptedAdapter::always("b", Step::Reply(json!("ok")));
    let mut patient = provider("a", 1, 0);
    patient.timeout_ms = 10_000;
    let harness = Harness::new(vec![patient, provider("b", 2, 0)], vec![a, b.clone()]);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
    let err = harness
        .orchestrator
        .invoke_with_deadline("ocr", json!({}), deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, InvocationError::DeadlineExceeded { .. }));
    assert_eq!(err.failures()[0].cause, FailureCause::Cancelled);
    assert_eq!(b.calls(), 0);
    assert_eq!(
        harness.summary(),
        vec![row("a", CallStatus::Error, Some(FailureKind::Cancelled))]
    );
    // cancelled calls do not count toward the error trip
    assert_eq!(
        harness.orchestrator.limiter().stats("a").unwrap().recent_errors,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_admission_writes_no_record() {
    let a = ScriptedAdapter::always("a", Step::Reply(json!("ok")));
    let harness = Harness::new(vec![provider("a", 1, 0)], vec![a.clone()]);
    for _ in 0..3 {
        harness.orchestrator.limiter().observe_failure("a");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
    let err = harness
        .orchestrator
        .invoke_with_deadline("ocr", json!({}), deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, InvocationError::DeadlineExceeded { .. }));
    assert_eq!(a.calls(), 0);
    assert!(harness.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_enabled_providers() {
    let mut off = provider("a", 1, 0);
    off.enabled = false;
    let harness = Harness::new(vec![off], Vec::new());

    assert_eq!(
        harness.orchestrator.invoke("ocr", json!({})).await.unwrap_err(),
        InvocationError::NoProviders
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_invocations_each_log_one_success() {
    let a = ScriptedAdapter::always("a", Step::Slow(Duration::from_millis(5), json!("ok")));
    let harness = Arc::new(Harness::new(vec![provider("a", 1, 0)], vec![a]));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                harness
                    .orchestrator
                    .invoke("ocr", json!({ "n": i }))
                    .await
                    .unwrap()
                    .invocation_id
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 20);

    let records = harness.records();
    assert_eq!(records.len(), 20);
    for id in ids {
        let successes = records
            .iter()
            .filter(|r| r.invocation_id == Some(id) && r.status == CallStatus::Success)
            .count();
        assert_eq!(successes, 1);
    }
    assert_eq!(harness.orchestrator.logger().metrics().total_calls, 20);
}

#[tokio::test(start_paused = true)]
async fn test_reload_swaps_registry() {
    let a = ScriptedAdapter::always("a", Step::Reply(json!("a")));
    let b = ScriptedAdapter::always("b", Step::Reply(json!("b")));
    let harness = Harness::new(vec![provider("a", 1, 0), provider("b", 2, 0)], vec![a, b]);

    let mut demoted = provider("a", 9, 0);
    demoted.max_calls_per_window = 5;
    harness
        .orchestrator
        .reload(ProviderRegistry::from_providers(vec![demoted, provider("b", 2, 0)]).unwrap())
        .unwrap();

    let result = harness.orchestrator.invoke("ocr", json!({})).await.unwrap();
    assert_eq!(result.provider_used, "b");
    assert_eq!(harness.orchestrator.limiter().stats("a").unwrap().max, 5);

    let unknown = ProviderRegistry::from_providers(vec![provider("c", 1, 0)]).unwrap();
    assert!(matches!(
        harness.orchestrator.reload(unknown),
        Err(BuildError::MissingAdapter { provider }) if provider == "c"
    ));
    // failed reload leaves the registry alone
    assert_eq!(harness.orchestrator.registry().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_provider_status() {
    let a = ScriptedAdapter::always("a", Step::Reply(json!("a")));
    let mut off = provider("b", 2, 0);
    off.enabled = false;
    let harness = Harness::new(vec![provider("a", 1, 0), off], vec![a]);
    harness.orchestrator.invoke("ocr", json!({})).await.unwrap();

    let status = harness.orchestrator.provider_status();
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, "a");
    assert!(status[0].has_adapter);
    assert_eq!(status[0].window.as_ref().unwrap().current, 1);
    assert!(!status[1].enabled);
    assert!(!status[1].has_adapter);
}

#[test]
fn test_builder_requires_adapter_for_enabled_providers() {
    let registry = ProviderRegistry::from_providers(vec![provider("a", 1, 0)]).unwrap();
    assert!(matches!(
        Orchestrator::builder().registry(registry).build(),
        Err(BuildError::MissingAdapter { provider }) if provider == "a"
    ));
    assert!(matches!(
        Orchestrator::builder().build(),
        Err(BuildError::MissingRegistry)
    ));
}
