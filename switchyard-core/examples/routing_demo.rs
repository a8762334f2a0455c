//! Routing Demo - Fallback, Circuit Breaking and Cost-Aware Rotation
//!
//! Runs offline against simulated providers:
//! - a flaky primary that trips its circuit breaker
//! - two healthy providers rotated by cost
//!
//! Pass a config file to route real traffic instead:
//!
//!     cargo run --example routing_demo -- router.yaml "Explain monads briefly"

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::config::{
    self, CircuitBreakerConfig, LoadBalancing, ModelSpec, ProviderCategory, ProviderDescriptor,
    RetryConfig, RouterConfig,
};
use switchyard_core::logging::init_tracing;
use switchyard_core::providers::{ProviderClient, ProviderError, ProviderResult};
use switchyard_core::{ClientRegistry, CompletionRequest, CompletionResponse, Router};

const MODEL: &str = "demo-model";

/// Fails every request until `heal_after` calls have been made
struct SimulatedProvider {
    name: String,
    heal_after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ProviderClient for SimulatedProvider {
    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> ProviderResult<CompletionResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        if call < self.heal_after {
            return Err(ProviderError::server(503, "simulated outage"));
        }
        Ok(CompletionResponse::new(
            format!("[{}] {}", self.name, request.prompt.to_uppercase()),
            MODEL,
        ))
    }
}

fn simulated_config() -> RouterConfig {
    let provider = |name: &str, priority: i32, cost: f64| {
        ProviderDescriptor::new(name, ProviderCategory::Custom)
            .with_priority(priority)
            .with_model(ModelSpec::new(MODEL, cost, cost * 2.0, 4_096))
            .with_retry(RetryConfig {
                max_attempts: 2,
                initial_delay_ms: 50,
                max_delay_ms: 200,
                backoff_factor: 2.0,
            })
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                open_duration_ms: 500,
            })
    };

    RouterConfig::new(vec![
        provider("flaky-primary", 2, 5.0),
        provider("budget", 1, 0.5),
        provider("standard", 1, 2.0),
    ])
    .with_strategy(LoadBalancing::CostPriorityRoundRobin)
    .with_default_model(MODEL)
}

fn simulated_registry() -> ClientRegistry {
    ClientRegistry::new().with_factory(ProviderCategory::Custom, |descriptor| {
        let heal_after = if descriptor.name == "flaky-primary" { 4 } else { 0 };
        Ok(Arc::new(SimulatedProvider {
            name: descriptor.name.clone(),
            heal_after,
            calls: AtomicUsize::new(0),
        }) as Arc<dyn ProviderClient>)
    })
}

async fn run_simulation() -> anyhow::Result<()> {
    let router = Router::create(simulated_config(), &simulated_registry())?;

    for round in 1..=8 {
        let response = router
            .execute(CompletionRequest::new(format!("request {round}")))
            .await?;
        println!(
            "round {round}: {} (fallback: {}, attempts: {})",
            response.text, response.metadata["fallback_used"], response.metadata["attempts"]
        );

        if round == 4 {
            println!("-- waiting for the primary's circuit to half-open --");
            tokio::time::sleep(Duration::from_millis(600)).await;
        }
    }

    println!("\nHealth: {}", serde_json::to_string_pretty(&router.health())?);
    for status in router.get_all_providers_status() {
        println!(
            "{:<14} state={:<9} ok={} failed={} credit={:.2}",
            status.name,
            status.state,
            status.total_successes,
            status.total_failures,
            status.rotation_credit
        );
    }
    Ok(())
}

async fn run_configured(path: &str, prompt: &str) -> anyhow::Result<()> {
    let config = config::load(path)?;
    let registry = ClientRegistry::with_defaults(&config.connection);
    let router = Router::create(config, &registry)?;

    let response = router.execute(CompletionRequest::new(prompt)).await?;
    println!("{} via {} ({})", response.text, response.provider, response.model);
    println!(
        "tokens: {} prompt / {} completion, estimated cost ${}",
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
        response.metadata["estimated_cost_usd"]
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,switchyard_core=debug");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [path, prompt, ..] => run_configured(path, prompt).await,
        [path] => run_configured(path, "Say hello in one sentence.").await,
        [] => run_simulation().await,
    }
}
