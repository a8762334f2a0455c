//! HTTP error mapping utilities

use crate::providers::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Map an HTTP status, headers and body to a `ProviderError`
pub fn map_http_error(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<String>,
    request_id: Uuid,
) -> ProviderError {
    let error_details = body
        .as_ref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_details(&v));

    let error_message = error_details
        .as_ref()
        .map(|d| d.message.clone())
        .or_else(|| body.clone().filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    let message_with_id = format!("{} [request_id: {}]", error_message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication {
            message: message_with_id,
        },

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .and_then(|h| h.get(RETRY_AFTER))
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .or_else(|| {
                    error_details
                        .and_then(|d| d.retry_after_seconds)
                        .map(Duration::from_secs)
                });

            ProviderError::RateLimit { retry_after }
        }

        StatusCode::BAD_REQUEST => ProviderError::InvalidRequest {
            message: message_with_id,
        },

        StatusCode::NOT_FOUND => ProviderError::ModelNotAvailable {
            model: extract_model_from_error(&error_message)
                .unwrap_or_else(|| "unknown".to_string()),
        },

        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,

        status if status.is_server_error() => ProviderError::ServerError {
            status_code: status.as_u16(),
            message: message_with_id,
        },

        status if status.is_client_error() => ProviderError::InvalidRequest {
            message: message_with_id,
        },

        _ => ProviderError::Custom {
            code: format!("HTTP_{}", status.as_u16()),
            message: message_with_id,
        },
    }
}

struct ErrorDetails {
    message: String,
    retry_after_seconds: Option<u64>,
}

/// Extract error details from the common JSON error envelopes
fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // OpenAI / Anthropic / Google: { "error": { "message": "..." } }
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: error.get("retry_after").and_then(|v| v.as_u64()),
            });
        }

        // Ollama: { "error": "..." }
        if let Some(message) = error.as_str() {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: None,
            });
        }
    }

    if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
        return Some(ErrorDetails {
            message: message.to_string(),
            retry_after_seconds: json.get("retry_after").and_then(|v| v.as_u64()),
        });
    }

    None
}

/// Try to extract a model name from messages like "model 'gpt-4' not found"
fn extract_model_from_error(message: &str) -> Option<String> {
    for (open, close) in [("model '", '\''), ("model \"", '"'), ("model `", '`')] {
        if let Some(start) = message.find(open) {
            let start = start + open.len();
            if let Some(end) = message[start..].find(close) {
                return Some(message[start..start + end].to_string());
            }
        }
    }
    None
}

/// Parse a Retry-After header value given in seconds
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    header_value
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
