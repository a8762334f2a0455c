//! Switchyard Core Library
//!
//! Routes text-completion requests across interchangeable LLM providers
//! with per-provider retry, circuit breaking and cost-aware rotation.
//!
//! ```no_run
//! use switchyard_core::{config, ClientRegistry, CompletionRequest, Router};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = config::load("router.yaml")?;
//! let registry = ClientRegistry::with_defaults(&config.connection);
//! let router = Router::create(config, &registry)?;
//!
//! let response = router.execute(CompletionRequest::new("Hello")).await?;
//! println!("{} via {}", response.text, response.provider);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod providers;
pub mod routing;

pub use config::{LoadBalancing, ProviderCategory, ProviderDescriptor, RouterConfig};
pub use protocol::{CompletionRequest, CompletionResponse, TokenUsage};
pub use providers::{ClientRegistry, ProviderClient, ProviderError};
pub use routing::{BreakerState, ProviderConfigUpdate, Router, RouterError};

/// Returns the version of the Switchyard Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
