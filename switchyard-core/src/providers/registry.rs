//! Category-to-factory registry used when the router instantiates clients

use crate::config::{ConnectionConfig, ProviderCategory, ProviderDescriptor};
use crate::http::HttpClient;
use crate::providers::anthropic::AnthropicClient;
use crate::providers::client::ProviderClient;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::google::GoogleClient;
use crate::providers::openai::OpenAiCompatibleClient;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a client for one descriptor
pub type ClientFactory =
    Arc<dyn Fn(&ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderClient>> + Send + Sync>;

/// Maps a provider category to the factory that builds its client
#[derive(Clone, Default)]
pub struct ClientRegistry {
    factories: HashMap<ProviderCategory, ClientFactory>,
}

impl ClientRegistry {
    /// Empty registry; every category must be registered explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTTP clients for openai, anthropic,
    /// google and ollama
    pub fn with_defaults(connection: &ConnectionConfig) -> Self {
        let mut registry = Self::new();

        let conn = connection.clone();
        let openai: ClientFactory = Arc::new(move |descriptor| {
            let client = OpenAiCompatibleClient::new(descriptor, HttpClient::new(&conn)?)?;
            Ok(Arc::new(client) as Arc<dyn ProviderClient>)
        });
        registry.register(ProviderCategory::OpenAI, openai.clone());
        registry.register(ProviderCategory::Ollama, openai);

        let conn = connection.clone();
        registry.register(
            ProviderCategory::Anthropic,
            Arc::new(move |descriptor| {
                let client = AnthropicClient::new(descriptor, HttpClient::new(&conn)?)?;
                Ok(Arc::new(client) as Arc<dyn ProviderClient>)
            }),
        );

        let conn = connection.clone();
        registry.register(
            ProviderCategory::Google,
            Arc::new(move |descriptor| {
                let client = GoogleClient::new(descriptor, HttpClient::new(&conn)?)?;
                Ok(Arc::new(client) as Arc<dyn ProviderClient>)
            }),
        );

        registry
    }

    /// Add or replace the factory for a category
    pub fn register(&mut self, category: ProviderCategory, factory: ClientFactory) {
        self.factories.insert(category, factory);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_factory<F>(mut self, category: ProviderCategory, factory: F) -> Self
    where
        F: Fn(&ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderClient>>
            + Send
            + Sync
            + 'static,
    {
        self.register(category, Arc::new(factory));
        self
    }

    pub fn contains(&self, category: ProviderCategory) -> bool {
        self.factories.contains_key(&category)
    }

    /// Build the client for a descriptor
    pub fn create(&self, descriptor: &ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderClient>> {
        let factory = self.factories.get(&descriptor.category).ok_or_else(|| {
            ProviderError::configuration(format!(
                "no client registered for provider type '{}'",
                descriptor.category
            ))
        })?;
        factory(descriptor)
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut categories: Vec<_> = self.factories.keys().map(|c| c.as_str()).collect();
        categories.sort_unstable();
        f.debug_struct("ClientRegistry")
            .field("categories", &categories)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSpec;

    #[test]
    fn test_defaults_cover_builtin_categories() {
        let registry = ClientRegistry::with_defaults(&ConnectionConfig::default());
        assert!(registry.contains(ProviderCategory::OpenAI));
        assert!(registry.contains(ProviderCategory::Anthropic));
        assert!(registry.contains(ProviderCategory::Google));
        assert!(registry.contains(ProviderCategory::Ollama));
        assert!(!registry.contains(ProviderCategory::Custom));
    }

    #[test]
    fn test_unregistered_category_fails() {
        let registry = ClientRegistry::new();
        let descriptor = ProviderDescriptor::new("mine", ProviderCategory::Custom)
            .with_model(ModelSpec::new("m", 0.0, 0.0, 100));

        match registry.create(&descriptor) {
            Err(ProviderError::Configuration { message }) => assert!(message.contains("custom")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_missing_key_fails_only_that_provider() {
        let registry = ClientRegistry::with_defaults(&ConnectionConfig::default());
        let descriptor = ProviderDescriptor::new("anthropic", ProviderCategory::Anthropic)
            .with_model(ModelSpec::new("claude-3-5-haiku", 0.8, 4.0, 8_192));
        assert!(registry.create(&descriptor).is_err());
    }
}
