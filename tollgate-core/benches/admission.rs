use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::calls::{CallLogger, CallStatus};
use tollgate_core::clock::MockClock;
use tollgate_core::config::CircuitConfig;
use tollgate_core::limiter::{RateLimit, RateLimiterState};

fn limiter(providers: usize, clock: &MockClock) -> RateLimiterState {
    let limits: HashMap<String, RateLimit> = (0..providers)
        .map(|i| {
            (
                format!("provider-{i}"),
                RateLimit {
                    window_size: Duration::from_secs(60),
                    max_calls: u32::MAX,
                    backoff: Duration::from_secs(1),
                },
            )
        })
        .collect();
    RateLimiterState::new(limits, CircuitConfig::default(), Arc::new(clock.clone()))
}

fn bench_check_admission(c: &mut Criterion) {
    let clock = MockClock::new(0);
    let single = limiter(1, &clock);
    c.bench_function("check_admission/single_provider", |b| {
        b.iter(|| single.check_admission(black_box("provider-0")))
    });

    let many = limiter(64, &clock);
    let names: Vec<String> = (0..64).map(|i| format!("provider-{i}")).collect();
    let mut i = 0;
    c.bench_function("check_admission/64_providers", |b| {
        b.iter(|| {
            i = (i + 1) % names.len();
            many.check_admission(black_box(&names[i]))
        })
    });

    // bucket rolls over on every check
    let rolling = limiter(1, &clock);
    c.bench_function("check_admission/new_window", |b| {
        b.iter(|| {
            clock.advance(Duration::from_secs(60));
            rolling.check_admission(black_box("provider-0"))
        })
    });
}

fn bench_record(c: &mut Criterion) {
    let logger = CallLogger::in_memory(Arc::new(MockClock::new(0)));
    c.bench_function("call_logger/record_memory", |b| {
        b.iter(|| {
            logger.record(
                black_box("provider-0"),
                "extract_invoice",
                Duration::from_millis(120),
                CallStatus::Success,
                None,
            )
        })
    });
}

criterion_group!(benches, bench_check_admission, bench_record);
criterion_main!(benches);
