//! Protocol module for completion request/response structures
//!
//! These are the provider-agnostic shapes the router accepts and returns;
//! each provider client maps them to and from its own wire format.

pub mod types;

pub use types::{CompletionRequest, CompletionResponse, SamplingParams, TokenUsage};
