//! Bundled HTTP provider adapter
//!
//! Covers OpenAI-compatible JSON endpoints. Other backends implement
//! [`crate::providers::ProviderAdapter`] directly.

pub mod client;
pub mod error;

pub use client::HttpAdapter;
pub use error::{map_http_error, parse_retry_after, ErrorMapper};
