//! Fallback Demo - ranked providers with a flaky primary
//!
//! Two in-process adapters stand in for real backends:
//! - `nvidia` (priority 1) fails with a 503 every other call
//! - `mistral` (priority 2) always answers
//!
//! Run with: cargo run --example fallback_demo

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tollgate_core::config::ProviderConfig;
use tollgate_core::providers::RetryPolicy;
use tollgate_core::{AdapterRequest, Orchestrator, ProviderAdapter, ProviderError, ProviderRegistry};

struct Flaky {
    calls: AtomicU32,
}

#[async_trait]
impl ProviderAdapter for Flaky {
    fn name(&self) -> &str {
        "nvidia"
    }

    async fn call(&self, request: AdapterRequest<'_>) -> Result<Value, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            return Err(ProviderError::ServerError {
                status_code: 503,
                message: "model overloaded".into(),
            });
        }
        Ok(json!({"provider": "nvidia", "operation": request.operation}))
    }
}

struct Steady;

#[async_trait]
impl ProviderAdapter for Steady {
    fn name(&self) -> &str {
        "mistral"
    }

    async fn call(&self, request: AdapterRequest<'_>) -> Result<Value, ProviderError> {
        Ok(json!({"provider": "mistral", "payload": request.payload}))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut nvidia = ProviderConfig::new("nvidia", 1);
    nvidia.max_calls_per_window = 3;
    let mistral = ProviderConfig::new("mistral", 2);

    let orchestrator = Orchestrator::builder()
        .registry(ProviderRegistry::from_providers(vec![nvidia, mistral])?)
        .adapter("nvidia", Flaky { calls: AtomicU32::new(0) })
        .adapter("mistral", Steady)
        .retry_policy(RetryPolicy::fixed(Duration::from_millis(50)))
        .build()?;

    for i in 0..4 {
        match orchestrator
            .invoke("extract_invoice", json!({"invoice": i}))
            .await
        {
            Ok(result) => println!(
                "invoice {i}: answered by {} (fallback: {}, attempts: {})",
                result.provider_used, result.used_fallback, result.attempts
            ),
            Err(e) => println!("invoice {i}: failed: {e}"),
        }
    }

    println!();
    for status in orchestrator.provider_status() {
        if let Some(window) = status.window {
            println!(
                "{}: {}/{} calls this window, circuit {}",
                status.name, window.current, window.max, window.circuit
            );
        }
    }

    println!("\n{}", orchestrator.logger().report());
    Ok(())
}
