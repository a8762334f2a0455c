//! Shared helpers for router integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_core::config::{
    CircuitBreakerConfig, ModelSpec, ProviderCategory, ProviderDescriptor, RetryConfig,
    RouterConfig,
};
use switchyard_core::protocol::{CompletionRequest, CompletionResponse, TokenUsage};
use switchyard_core::providers::{ClientRegistry, ProviderClient, ProviderError, ProviderResult};
use switchyard_core::Router;
use tokio::time::Instant;

pub const MODEL: &str = "test-model";

/// Provider client that replays a script of outcomes, then repeats a
/// fallback outcome forever
pub struct ScriptedClient {
    name: String,
    script: Mutex<VecDeque<Result<(), ProviderError>>>,
    fallback: Result<(), ProviderError>,
    latency: Option<Duration>,
    usage: Option<TokenUsage>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn succeeding(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Vec::new(), Ok(()), None))
    }

    pub fn failing(name: &str, error: ProviderError) -> Arc<Self> {
        Arc::new(Self::build(name, Vec::new(), Err(error), None))
    }

    /// Play `script` first, then succeed
    pub fn scripted(name: &str, script: Vec<Result<(), ProviderError>>) -> Arc<Self> {
        Arc::new(Self::build(name, script, Ok(()), None))
    }

    /// Play `script` first, then keep failing with `error`
    pub fn scripted_then_failing(
        name: &str,
        script: Vec<Result<(), ProviderError>>,
        error: ProviderError,
    ) -> Arc<Self> {
        Arc::new(Self::build(name, script, Err(error), None))
    }

    pub fn slow(name: &str, latency: Duration, script: Vec<Result<(), ProviderError>>) -> Arc<Self> {
        Arc::new(Self::build(name, script, Ok(()), Some(latency)))
    }

    pub fn with_reported_usage(name: &str, usage: TokenUsage) -> Arc<Self> {
        let mut client = Self::build(name, Vec::new(), Ok(()), None);
        client.usage = Some(usage);
        Arc::new(client)
    }

    fn build(
        name: &str,
        script: Vec<Result<(), ProviderError>>,
        fallback: Result<(), ProviderError>,
        latency: Option<Duration>,
    ) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            latency,
            usage: None,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request.clone());

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        outcome.map(|()| {
            let mut response = CompletionResponse::new(
                format!("answer from {}", self.name),
                request.model.clone().unwrap_or_default(),
            );
            if let Some(usage) = self.usage {
                response.usage = usage;
            }
            response
        })
    }
}

/// Descriptor serving [`MODEL`] with fast retry settings
pub fn descriptor(name: &str, priority: i32, cost: f64) -> ProviderDescriptor {
    ProviderDescriptor::new(name, ProviderCategory::Custom)
        .with_priority(priority)
        .with_model(ModelSpec::new(MODEL, cost, cost, 1_000))
        .with_retry(RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
        })
        .with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 1,
            open_duration_ms: 1_000,
        })
}

/// Registry that hands out the given clients by provider name
pub fn registry(clients: &[Arc<ScriptedClient>]) -> ClientRegistry {
    let by_name: HashMap<String, Arc<ScriptedClient>> = clients
        .iter()
        .map(|c| (c.name.clone(), Arc::clone(c)))
        .collect();

    ClientRegistry::new().with_factory(ProviderCategory::Custom, move |descriptor| {
        by_name
            .get(&descriptor.name)
            .map(|c| Arc::clone(c) as Arc<dyn ProviderClient>)
            .ok_or_else(|| ProviderError::configuration("no scripted client"))
    })
}

pub fn router(config: RouterConfig, clients: &[Arc<ScriptedClient>]) -> Router {
    Router::create(config.with_default_model(MODEL), &registry(clients)).unwrap()
}

pub fn request() -> CompletionRequest {
    CompletionRequest::new("What is the capital of France?")
}
