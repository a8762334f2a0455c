//! Anthropic messages API client

use crate::config::ProviderDescriptor;
use crate::http::{HttpClient, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::providers::client::{required_model, ProviderClient};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory on this API
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicClient {
    provider: String,
    http: HttpClient,
    endpoint: String,
    headers: HeaderMap,
}

impl AnthropicClient {
    pub fn new(descriptor: &ProviderDescriptor, http: HttpClient) -> ProviderResult<Self> {
        let base_url = descriptor.resolved_base_url().ok_or_else(|| {
            ProviderError::configuration(format!("provider '{}' has no base_url", descriptor.name))
        })?;

        let key = descriptor
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ProviderError::configuration(format!(
                    "provider '{}' requires an api_key",
                    descriptor.name
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(key.expose_secret())
                .map_err(|_| ProviderError::configuration("API key contains invalid characters"))?,
        );
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(Self {
            provider: descriptor.name.clone(),
            http,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            headers,
        })
    }

    fn build_body(request: &CompletionRequest, model: &str) -> MessagesBody {
        let params = &request.params;
        MessagesBody {
            model: model.to_string(),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            messages: vec![json!({"role": "user", "content": request.prompt})],
            temperature: params.temperature,
            top_p: params.top_p,
            stop_sequences: (!params.stop.is_empty()).then(|| params.stop.clone()),
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse> {
        let model = required_model(request)?;
        let body = Self::build_body(request, model);
        let options = RequestOptions::for_request(request);

        let raw: MessagesResponse = self
            .http
            .post_json(&self.endpoint, self.headers.clone(), &body, &options)
            .await?;

        let text: String = raw
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if raw.content.is_empty() {
            return Err(ProviderError::parse(format!(
                "{} returned no content blocks",
                self.provider
            )));
        }

        let mut response = CompletionResponse::new(text, raw.model.unwrap_or_else(|| model.to_string()));
        if let Some(usage) = raw.usage {
            response.usage = TokenUsage::new(usage.input_tokens, usage.output_tokens);
        }
        response.finish_reason = raw.stop_reason;
        if let Some(id) = raw.id {
            response.metadata.insert("id".to_string(), json!(id));
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
