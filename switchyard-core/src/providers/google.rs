//! Google Gemini `generateContent` client

use crate::config::ProviderDescriptor;
use crate::http::{HttpClient, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::providers::client::{required_model, ProviderClient};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct GoogleClient {
    provider: String,
    http: HttpClient,
    base_url: String,
    headers: HeaderMap,
}

impl GoogleClient {
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
            HeaderName::from_static("x-goog-api-key"),
            HeaderValue::from_str(key.expose_secret())
                .map_err(|_| ProviderError::configuration("API key contains invalid characters"))?,
        );

        Ok(Self {
            provider: descriptor.name.clone(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn build_body(request: &CompletionRequest) -> GenerateContentBody {
        let params = &request.params;
        GenerateContentBody {
            contents: vec![json!({"role": "user", "parts": [{"text": request.prompt}]})],
            system_instruction: request
                .system
                .as_ref()
                .map(|system| json!({"parts": [{"text": system}]})),
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                top_p: params.top_p,
                stop_sequences: (!params.stop.is_empty()).then(|| params.stop.clone()),
            },
        }
    }
}

#[async_trait]
impl ProviderClient for GoogleClient {
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse> {
        let model = required_model(request)?;
        let body = Self::build_body(request);
        let options = RequestOptions::for_request(request);

        let raw: GenerateContentResponse = self
            .http
            .post_json(&self.endpoint(model), self.headers.clone(), &body, &options)
            .await?;

        let candidate = raw.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::parse(format!("{} returned no candidates", self.provider))
        })?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let mut response = CompletionResponse::new(
            text,
            raw.model_version.unwrap_or_else(|| model.to_string()),
        );
        if let Some(usage) = raw.usage_metadata {
            response.usage = TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count);
        }
        response.finish_reason = candidate.finish_reason;

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
