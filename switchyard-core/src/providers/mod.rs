//! Provider clients
//!
//! A provider client runs one completion call against one backend. The
//! router only sees the [`ProviderClient`] trait; the [`ClientRegistry`]
//! decides at startup which implementation serves each provider category.

pub mod anthropic;
pub mod client;
pub mod error;
pub mod google;
pub mod openai;
pub mod registry;

pub use anthropic::AnthropicClient;
pub use client::{estimate_tokens, ProviderClient};
pub use error::{ProviderError, ProviderResult};
pub use google::GoogleClient;
pub use openai::OpenAiCompatibleClient;
pub use registry::{ClientFactory, ClientRegistry};
