//! Provider client contract
//!
//! The router is agnostic to how a completion is transported; it only needs
//! something that can run one completion call and estimate prompt size.

use crate::protocol::{CompletionRequest, CompletionResponse};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;

/// Executes completions against one backend
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Run one completion call. `request.model` is always set by the router.
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse>;

    /// Rough token count for a piece of text
    fn estimate_tokens(&self, text: &str) -> u32 {
        estimate_tokens(text)
    }
}

/// Four characters per token, rounded up
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Model the router resolved for this request
pub(crate) fn required_model(request: &CompletionRequest) -> ProviderResult<&str> {
    request
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest {
            message: "request has no model".to_string(),
        })
}
