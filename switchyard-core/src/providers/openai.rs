//! OpenAI-compatible chat completions client
//!
//! Serves both the `openai` category and `ollama`, whose `/v1` endpoint
//! speaks the same protocol and needs no key.

use crate::config::ProviderDescriptor;
use crate::http::{HttpClient, RequestOptions};
use crate::protocol::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::providers::client::{required_model, ProviderClient};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Client for `/chat/completions` style endpoints
pub struct OpenAiCompatibleClient {
    provider: String,
    http: HttpClient,
    endpoint: String,
    headers: HeaderMap,
}

impl OpenAiCompatibleClient {
    /// Build from a descriptor; an API key is required unless the category
    /// is keyless (ollama)
    pub fn new(descriptor: &ProviderDescriptor, http: HttpClient) -> ProviderResult<Self> {
        let base_url = descriptor.resolved_base_url().ok_or_else(|| {
            ProviderError::configuration(format!("provider '{}' has no base_url", descriptor.name))
        })?;

        let mut headers = HeaderMap::new();
        match descriptor.api_key.as_ref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                    .map_err(|_| ProviderError::configuration("API key contains invalid characters"))?;
                headers.insert(AUTHORIZATION, value);
            }
            None if descriptor.category.requires_api_key() => {
                return Err(ProviderError::configuration(format!(
                    "provider '{}' requires an api_key",
                    descriptor.name
                )));
            }
            None => {}
        }

        Ok(Self {
            provider: descriptor.name.clone(),
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers,
        })
    }

    fn build_body(request: &CompletionRequest, model: &str) -> ChatCompletionBody {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let params = &request.params;
        ChatCompletionBody {
            model: model.to_string(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: (!params.stop.is_empty()).then(|| params.stop.clone()),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse> {
        let model = required_model(request)?;
        let body = Self::build_body(request, model);
        let options = RequestOptions::for_request(request);

        let raw: ChatCompletionResponse = self
            .http
            .post_json(&self.endpoint, self.headers.clone(), &body, &options)
            .await?;

        let choice = raw.choices.into_iter().next().ok_or_else(|| {
            ProviderError::parse(format!("{} returned no choices", self.provider))
        })?;

        let mut response = CompletionResponse::new(
            choice.message.content.unwrap_or_default(),
            raw.model.unwrap_or_else(|| model.to_string()),
        );
        if let Some(usage) = raw.usage {
            response.usage = TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);
        }
        response.finish_reason = choice.finish_reason;
        if let Some(id) = raw.id {
            response.metadata.insert("id".to_string(), json!(id));
        }
        if let Some(fingerprint) = raw.system_fingerprint {
            response
                .metadata
                .insert("system_fingerprint".to_string(), json!(fingerprint));
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    system_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ModelSpec, ProviderCategory};

    fn http() -> HttpClient {
        HttpClient::new(&ConnectionConfig::default()).unwrap()
    }

    #[test]
    fn test_openai_requires_key() {
        let descriptor = ProviderDescriptor::new("openai", ProviderCategory::OpenAI)
            .with_model(ModelSpec::new("gpt-4o", 2.5, 10.0, 16_384));
        assert!(matches!(
            OpenAiCompatibleClient::new(&descriptor, http()),
            Err(ProviderError::Configuration { .. })
        ));
    }

    #[test]
    fn test_ollama_is_keyless_with_default_url() {
        let descriptor = ProviderDescriptor::new("ollama", ProviderCategory::Ollama)
            .with_model(ModelSpec::new("llama3", 0.0, 0.0, 8_192));
        let client = OpenAiCompatibleClient::new(&descriptor, http()).unwrap();
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");
        assert!(client.headers.is_empty());
    }

    #[test]
    fn test_body_maps_sampling_params() {
        let request = CompletionRequest::new("hello")
            .with_system("be brief")
            .with_temperature(0.1)
            .with_max_tokens(64)
            .with_stop_sequence("END");

        let body = serde_json::to_value(OpenAiCompatibleClient::build_body(&request, "gpt-4o"))
            .unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stop"][0], "END");
        assert!(body.get("top_p").is_none());
    }
}
