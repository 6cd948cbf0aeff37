//! HTTP status to provider error mapping

use crate::providers::error::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Maps non-success responses of one attempt to [`ProviderError`]s
#[derive(Debug, Clone, Copy)]
pub struct ErrorMapper {
    pub request_id: Uuid,
    /// Budget of the attempt, reported by gateway timeouts
    pub timeout: Duration,
}

impl ErrorMapper {
    pub fn new(request_id: Uuid, timeout: Duration) -> Self {
        Self {
            request_id,
            timeout,
        }
    }

    pub fn map(
        &self,
        status: StatusCode,
        headers: Option<&HeaderMap>,
        body: Option<String>,
    ) -> ProviderError {
        map_http_error(status, headers, body, self.request_id, self.timeout)
    }
}

/// Map a non-success response to a [`ProviderError`]
pub fn map_http_error(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<String>,
    request_id: Uuid,
    timeout: Duration,
) -> ProviderError {
    let details = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_details(&v));

    let message = details
        .as_ref()
        .map(|d| d.message.clone())
        .or_else(|| body.filter(|b| !b.trim().is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
    let message = format!("{} [request_id: {}]", message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Authentication { message }
        }

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .and_then(|h| h.get(RETRY_AFTER))
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .or_else(|| {
                    details
                        .and_then(|d| d.retry_after_seconds)
                        .map(Duration::from_secs)
                });
            ProviderError::RateLimit { retry_after }
        }

        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::InvalidRequest { message }
        }

        StatusCode::NOT_FOUND => ProviderError::NotFound { message },

        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProviderError::Timeout { after: timeout }
        }

        status if status.is_server_error() => ProviderError::ServerError {
            status_code: status.as_u16(),
            message,
        },

        status if status.is_client_error() => ProviderError::InvalidRequest { message },

        _ => ProviderError::custom(format!("HTTP_{}", status.as_u16()), message),
    }
}

struct ErrorDetails {
    message: String,
    retry_after_seconds: Option<u64>,
}

/// OpenAI-style `{"error": {"message": ...}}` or flat `{"message": ...}`
fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: error.get("retry_after").and_then(Value::as_u64),
            });
        }
        if let Some(message) = error.as_str() {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: None,
            });
        }
    }

    json.get("message").and_then(Value::as_str).map(|message| ErrorDetails {
        message: message.to_string(),
        retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
    })
}

/// Parse a `Retry-After` value given in seconds
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    header_value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
