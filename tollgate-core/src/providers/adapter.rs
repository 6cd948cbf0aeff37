//! Provider adapter trait
//!
//! An adapter translates the caller's JSON payload into one backend's wire
//! format and back. The orchestrator owns timing, retries and fallback; an
//! adapter performs exactly one call per invocation of [`ProviderAdapter::call`].

use crate::providers::error::ProviderError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Everything an adapter needs for a single attempt
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest<'a> {
    /// Logical operation, e.g. `"extract_invoice"`
    pub operation: &'a str,

    /// Caller payload, passed through untouched
    pub payload: &'a Value,

    /// Time budget for this attempt; the orchestrator also enforces it
    pub timeout: Duration,

    /// Correlates every attempt of one `invoke`
    pub invocation_id: Uuid,

    /// 0 for the first attempt against this provider, then 1, 2, ...
    pub attempt: u32,
}

/// Core trait every backend integration implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter name, used in logs and diagnostics
    fn name(&self) -> &str;

    /// Perform one call
    async fn call(&self, request: AdapterRequest<'_>) -> Result<Value, ProviderError>;
}
