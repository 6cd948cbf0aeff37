//! Providers: adapter contract, error taxonomy, retry backoff and registry

pub mod adapter;
pub mod error;
pub mod registry;
pub mod retry;

pub use adapter::{AdapterRequest, ProviderAdapter};
pub use error::{ProviderError, ProviderResult};
pub use registry::{ProviderRegistry, ProviderSpec};
pub use retry::RetryPolicy;
