//! JSON-over-HTTP adapter using reqwest

use crate::config::EndpointConfig;
use crate::http::error::ErrorMapper;
use crate::providers::adapter::{AdapterRequest, ProviderAdapter};
use crate::providers::error::ProviderError;
use crate::providers::registry::ProviderSpec;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Maximum response size (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("tollgate/", env!("CARGO_PKG_VERSION"));

/// Adapter for OpenAI-compatible JSON endpoints
///
/// Sends `{"operation", "model", "payload"}` to the configured URL and returns
/// the decoded response body as-is. The per-call timeout comes from the
/// [`AdapterRequest`].
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    name: String,
    endpoint: EndpointConfig,
    /// reqwest clients are internally reference counted
    client: Client,
    max_response_size: usize,
}

impl HttpAdapter {
    /// Create an adapter with a pooled client
    pub fn new(name: impl Into<String>, endpoint: EndpointConfig) -> Result<Self, ProviderError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::custom("CLIENT_BUILD", format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self::with_client(name, endpoint, client))
    }

    /// Create an adapter sharing an existing client
    pub fn with_client(name: impl Into<String>, endpoint: EndpointConfig, client: Client) -> Self {
        Self {
            name: name.into(),
            endpoint,
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    /// Adapter for a registry entry that declares an `endpoint` block
    pub fn for_provider(spec: &ProviderSpec) -> Result<Self, ProviderError> {
        let endpoint = spec.endpoint.clone().ok_or_else(|| {
            ProviderError::custom(
                "NO_ENDPOINT",
                format!("Provider '{}' has no endpoint configured", spec.name),
            )
        })?;
        Self::new(spec.name.clone(), endpoint)
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    fn body(&self, request: &AdapterRequest<'_>) -> Value {
        let mut body = json!({
            "operation": request.operation,
            "payload": request.payload,
        });
        if let (Some(model), Some(map)) = (&self.endpoint.model, body.as_object_mut()) {
            map.insert("model".to_string(), Value::String(model.clone()));
        }
        body
    }

    fn check_content_length(&self, response: &Response) -> Result<(), ProviderError> {
        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_size {
                return Err(ProviderError::custom(
                    "RESPONSE_TOO_LARGE",
                    format!(
                        "Response size {} exceeds maximum {}",
                        content_length, self.max_response_size
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: AdapterRequest<'_>) -> Result<Value, ProviderError> {
        let request_id = request.invocation_id;
        let url = self.endpoint.url();
        debug!(provider = %self.name, %url, %request_id, attempt = request.attempt, "sending request");

        let mut builder = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .header("X-Request-ID", request_id.to_string())
            .json(&self.body(&request));

        if let Some(ref key) = self.endpoint.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        for (key, value) in &self.endpoint.headers {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(provider = %self.name, %request_id, "request timed out");
                ProviderError::Timeout {
                    after: request.timeout,
                }
            } else if e.is_connect() {
                error!(provider = %self.name, %request_id, error = %e, "connection failed");
                ProviderError::Network {
                    message: format!("Connection failed: {} [request_id: {}]", e, request_id),
                }
            } else {
                error!(provider = %self.name, %request_id, error = %e, "request failed");
                ProviderError::Network {
                    message: format!("{} [request_id: {}]", e, request_id),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            warn!(provider = %self.name, %request_id, status = status.as_u16(), "provider returned error status");
            return Err(ErrorMapper::new(request_id, request.timeout).map(status, Some(&headers), body));
        }

        self.check_content_length(&response)?;

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    after: request.timeout,
                }
            } else {
                ProviderError::Network {
                    message: format!("Failed to read response body: {} [request_id: {}]", e, request_id),
                }
            }
        })?;

        if text.len() > self.max_response_size {
            return Err(ProviderError::custom(
                "RESPONSE_TOO_LARGE",
                format!(
                    "Response size {} exceeds maximum {} [request_id: {}]",
                    text.len(),
                    self.max_response_size,
                    request_id
                ),
            ));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            error!(provider = %self.name, %request_id, error = %e, "invalid response body");
            ProviderError::custom(
                "PARSE_ERROR",
                format!("Invalid response format: {} [request_id: {}]", e, request_id),
            )
        })?;

        info!(provider = %self.name, %request_id, "request completed");
        Ok(value)
    }
}
