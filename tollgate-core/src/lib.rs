//! Tollgate Core Library
//!
//! Resilient invocation across ranked backend providers: per-provider rate
//! limiting and circuit breaking, retry with fallback in priority order, and
//! an append-only log of every attempted call.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = tollgate_core::config::load("tollgate.yaml")?;
//! let orchestrator = tollgate_core::OrchestratorBuilder::from_config(&config)?.build()?;
//! let result = orchestrator
//!     .invoke("extract_invoice", serde_json::json!({"document": "..."}))
//!     .await?;
//! println!("answered by {}", result.provider_used);
//! # Ok(())
//! # }
//! ```

pub mod calls;
pub mod clock;
pub mod config;
pub mod http;
pub mod limiter;
pub mod orchestrator;
pub mod providers;

pub use calls::{CallLogger, CallRecord, CallStatus, Metrics};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, TollgateConfig};
pub use limiter::{Admission, RateLimit, RateLimiterState};
pub use orchestrator::{
    BuildError, FailureCause, Invocation, InvocationError, Orchestrator, OrchestratorBuilder,
    ProviderFailure, ProviderStatus,
};
pub use providers::{AdapterRequest, ProviderAdapter, ProviderError, ProviderRegistry};

/// Returns the version of the Tollgate Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
