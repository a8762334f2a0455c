//! HTTP client implementation using reqwest

use crate::config::ConnectionConfig;
use crate::http::error::map_http_error;
use crate::http::RequestOptions;
use crate::providers::{ProviderError, ProviderResult};
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum response size (10MB)
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("switchyard/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client (internally reference counted)
    client: Client,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl HttpClient {
    /// Create a client from connection settings
    pub fn new(connection: &ConnectionConfig) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(connection.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(connection.keepalive_secs))
            .connect_timeout(Duration::from_millis(connection.connect_timeout_ms))
            .timeout(Duration::from_millis(connection.request_timeout_ms))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
        options: &RequestOptions,
    ) -> ProviderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request_id = options.request_id;
        debug!(%url, %request_id, "Sending provider request");

        let mut builder = self
            .client
            .post(url)
            .headers(headers)
            .header("X-Request-ID", request_id.to_string())
            .json(body);

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(%request_id, "Provider request timed out");
                ProviderError::Timeout
            } else if e.is_connect() {
                warn!(%request_id, error = %e, "Provider connection failed");
                ProviderError::network(format!(
                    "Connection failed: {} [request_id: {}]",
                    e, request_id
                ))
            } else {
                warn!(%request_id, error = %e, "Provider request failed");
                ProviderError::network(format!("{} [request_id: {}]", e, request_id))
            }
        })?;

        let status = response.status();
        debug!(%status, %request_id, "Provider response received");

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            return Err(map_http_error(status, Some(&headers), body, request_id));
        }

        self.check_content_length(&response)?;

        let text = response.text().await.map_err(|e| {
            ProviderError::network(format!(
                "Failed to read response body: {} [request_id: {}]",
                e, request_id
            ))
        })?;

        if text.len() > self.max_response_size {
            return Err(ProviderError::Custom {
                code: "RESPONSE_TOO_LARGE".to_string(),
                message: format!(
                    "Response size {} exceeds maximum {} [request_id: {}]",
                    text.len(),
                    self.max_response_size,
                    request_id
                ),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::parse(format!(
                "Invalid response format: {} [request_id: {}]",
                e, request_id
            ))
        })
    }

    fn check_content_length(&self, response: &Response) -> ProviderResult<()> {
        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_size {
                return Err(ProviderError::Custom {
                    code: "RESPONSE_TOO_LARGE".to_string(),
                    message: format!(
                        "Response size {} exceeds maximum {}",
                        content_length, self.max_response_size
                    ),
                });
            }
        }
        Ok(())
    }
}
