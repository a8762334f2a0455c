//! HTTP layer for the built-in provider clients
//!
//! This module handles:
//! - Connection pooling and client management
//! - Error mapping and retry hints
//! - Request ID correlation

pub mod client;
pub mod error;

pub use client::HttpClient;
pub use error::{map_http_error, parse_retry_after};

use crate::protocol::CompletionRequest;
use std::time::Duration;
use uuid::Uuid;

/// Metadata key under which the router stores the request id
pub const REQUEST_ID_KEY: &str = "request_id";

/// Options for an HTTP request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Per-call timeout overriding the client default
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout: None,
        }
    }
}

impl RequestOptions {
    /// Options correlated with the router's request id when one is present
    pub fn for_request(request: &CompletionRequest) -> Self {
        let request_id = request
            .metadata
            .get(REQUEST_ID_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Self {
            request_id,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
