//! Router behavior: fallback, retries, circuit breaking and introspection

mod common;

use common::{descriptor, registry, request, router, ScriptedClient, MODEL};
use std::time::Duration;
use switchyard_core::config::{CircuitBreakerConfig, RetryConfig, RouterConfig};
use switchyard_core::providers::ProviderError;
use switchyard_core::routing::{CircuitBreakerUpdate, ProviderConfigUpdate};
use switchyard_core::{BreakerState, CompletionRequest, Router, RouterError, TokenUsage};

fn breaker(failure_threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        success_threshold: 1,
        open_duration_ms: 1_000,
    }
}

fn retry(max_attempts: u32, initial_delay_ms: u64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms,
        max_delay_ms: 10_000,
        backoff_factor: 2.0,
    }
}

#[test]
fn test_create_fails_with_no_enabled_provider() {
    let config = RouterConfig::new(vec![
        descriptor("a", 1, 1.0).with_enabled(false),
        descriptor("b", 1, 1.0).with_enabled(false),
    ]);
    let clients = [ScriptedClient::succeeding("a"), ScriptedClient::succeeding("b")];

    let err = Router::create(config, &registry(&clients)).unwrap_err();
    assert!(matches!(err, RouterError::Configuration { .. }));
}

#[test]
fn test_create_fails_when_no_client_initializes() {
    let config = RouterConfig::new(vec![descriptor("a", 1, 1.0)]);

    let err = Router::create(config, &registry(&[])).unwrap_err();
    match err {
        RouterError::Configuration { message } => {
            assert!(message.contains("no provider could be initialized"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_failed_client_is_excluded() {
    let config = RouterConfig::new(vec![descriptor("a", 1, 1.0), descriptor("b", 1, 1.0)]);
    let router = Router::create(config, &registry(&[ScriptedClient::succeeding("b")])).unwrap();

    assert_eq!(router.provider_names(), vec!["b"]);
    assert!(router.get_provider_status("a").is_none());
    assert!(matches!(
        router.update_provider_config("a", ProviderConfigUpdate::new().enabled(true)),
        Err(RouterError::ProviderNotFound(name)) if name == "a"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_missing_model_is_a_validation_error() {
    let client = ScriptedClient::succeeding("a");
    let config = RouterConfig::new(vec![descriptor("a", 1, 1.0)]);
    let router = Router::create(config, &registry(&[client.clone()])).unwrap();

    let err = router.execute(request()).await.unwrap_err();
    assert!(matches!(err, RouterError::Validation { .. }));
    assert_eq!(client.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_model_has_no_provider() {
    let client = ScriptedClient::succeeding("a");
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)]),
        &[client.clone()],
    );

    let err = router
        .execute(request().with_model("not-offered"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::NoProviderAvailable { model } if model == "not-offered"
    ));
    assert_eq!(client.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_success_with_backoff() {
    let client = ScriptedClient::scripted(
        "a",
        vec![
            Err(ProviderError::server(503, "busy")),
            Err(ProviderError::server(503, "busy")),
        ],
    );
    let config = RouterConfig::new(vec![descriptor("a", 1, 1.0).with_retry(RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 150,
        backoff_factor: 2.0,
    })]);
    let router = router(config, &[client.clone()]);

    let response = router.execute(request()).await.unwrap();
    assert_eq!(response.provider, "a");
    assert_eq!(response.metadata["attempts"], 3);
    assert_eq!(client.calls(), 3);

    let times = client.call_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![Duration::from_millis(100), Duration::from_millis(150)]
    );

    let status = router.get_provider_status("a").unwrap();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.total_successes, 1);
    assert_eq!(status.total_failures, 2);
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_provider_opens_and_is_skipped() {
    let a = ScriptedClient::failing("a", ProviderError::Timeout);
    let b = ScriptedClient::succeeding("b");
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0), descriptor("b", 1, 1.0)]),
        &[a.clone(), b.clone()],
    );

    let mut previous = 0;
    for _ in 0..10 {
        let response = router.execute(request()).await.unwrap();
        assert_eq!(response.provider, "b");

        let failures = router.get_provider_status("a").unwrap().consecutive_failures;
        assert!(failures == previous || failures == previous + 1);
        previous = failures;
    }

    let status = router.get_provider_status("a").unwrap();
    assert_eq!(status.state, BreakerState::Open);
    assert_eq!(status.consecutive_failures, 3);
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_closes_breaker() {
    let a = ScriptedClient::scripted("a", vec![Err(ProviderError::Timeout)]);
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0).with_circuit_breaker(breaker(1))]),
        &[a.clone()],
    );

    let err = router.execute(request()).await.unwrap_err();
    assert_eq!(err.provider_error("a"), Some(&ProviderError::Timeout));
    assert_eq!(
        router.get_provider_status("a").unwrap().state,
        BreakerState::Open
    );

    assert!(matches!(
        router.execute(request()).await,
        Err(RouterError::NoProviderAvailable { .. })
    ));
    assert_eq!(a.calls(), 1);

    tokio::time::advance(Duration::from_millis(1_000)).await;

    let response = router.execute(request()).await.unwrap();
    assert_eq!(response.provider, "a");
    let status = router.get_provider_status("a").unwrap();
    assert_eq!(status.state, BreakerState::Closed);
    assert!(!status.probe_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens_and_resets_timer() {
    let a = ScriptedClient::failing("a", ProviderError::Timeout);
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0).with_circuit_breaker(breaker(1))]),
        &[a.clone()],
    );

    assert!(router.execute(request()).await.is_err());

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(matches!(
        router.execute(request()).await,
        Err(RouterError::AllProvidersFailed { .. })
    ));
    assert_eq!(a.calls(), 2);
    assert_eq!(
        router.get_provider_status("a").unwrap().state,
        BreakerState::Open
    );

    // 1.6s after the first opening but only 0.6s after the reopen
    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(matches!(
        router.execute(request()).await,
        Err(RouterError::NoProviderAvailable { .. })
    ));
    assert_eq!(a.calls(), 2);

    tokio::time::advance(Duration::from_millis(400)).await;
    assert!(router.execute(request()).await.is_err());
    assert_eq!(a.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_only_one_half_open_probe_at_a_time() {
    let a = ScriptedClient::slow(
        "a",
        Duration::from_millis(500),
        vec![Err(ProviderError::Timeout)],
    );
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0).with_circuit_breaker(breaker(1))]),
        &[a.clone()],
    );

    assert!(router.execute(request()).await.is_err());
    tokio::time::advance(Duration::from_millis(1_000)).await;

    let (first, second) = tokio::join!(router.execute(request()), router.execute(request()));

    assert_eq!(first.unwrap().provider, "a");
    assert!(matches!(
        second,
        Err(RouterError::NoProviderAvailable { .. })
    ));
    assert_eq!(a.calls(), 2);
    assert_eq!(
        router.get_provider_status("a").unwrap().state,
        BreakerState::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_once_another_request_opens_the_breaker() {
    let a = ScriptedClient::slow(
        "a",
        Duration::from_millis(50),
        vec![
            Err(ProviderError::server(503, "busy")),
            Err(ProviderError::server(503, "busy")),
        ],
    );
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)
            .with_retry(retry(3, 100))
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                open_duration_ms: 10_000,
            })]),
        &[a.clone()],
    );

    // Both fail at 50ms; the second failure opens the breaker while the
    // first request is still backing off
    let (first, second) = tokio::join!(router.execute(request()), router.execute(request()));

    assert!(matches!(first, Err(RouterError::AllProvidersFailed { .. })));
    assert!(matches!(second, Err(RouterError::AllProvidersFailed { .. })));
    assert_eq!(a.calls(), 2);
    assert_eq!(
        router.get_provider_status("a").unwrap().state,
        BreakerState::Open
    );
}

#[tokio::test(start_paused = true)]
async fn test_preferred_providers_never_fall_back_outside_the_list() {
    let a = ScriptedClient::failing("a", ProviderError::server(500, "down"));
    let b = ScriptedClient::succeeding("b");
    let router = router(
        RouterConfig::new(vec![
            descriptor("a", 1, 1.0).with_retry(retry(2, 50)),
            descriptor("b", 1, 1.0),
        ]),
        &[a.clone(), b.clone()],
    );

    let err = router
        .execute_with_providers(request(), ["a"])
        .await
        .unwrap_err();

    match err {
        RouterError::AllProvidersFailed { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].0, "a");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 0);

    let response = router
        .execute(request().with_preferred_providers(["b"]))
        .await
        .unwrap();
    assert_eq!(response.provider, "b");
}

#[tokio::test(start_paused = true)]
async fn test_disable_at_runtime_takes_effect_immediately() {
    let a = ScriptedClient::succeeding("a");
    let b = ScriptedClient::succeeding("b");
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0), descriptor("b", 1, 1.0)]),
        &[a.clone(), b.clone()],
    );

    let status = router
        .update_provider_config("a", ProviderConfigUpdate::new().enabled(false))
        .unwrap();
    assert!(!status.enabled);

    for _ in 0..4 {
        assert_eq!(router.execute(request()).await.unwrap().provider, "b");
    }
    assert_eq!(a.calls(), 0);

    router
        .update_provider_config("a", ProviderConfigUpdate::new().enabled(true))
        .unwrap();
    for _ in 0..4 {
        router.execute(request()).await.unwrap();
    }
    assert_eq!(a.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_update_applies_to_next_failure() {
    let a = ScriptedClient::failing("a", ProviderError::Timeout);
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)]),
        &[a.clone()],
    );

    let update = ProviderConfigUpdate::new().circuit_breaker(CircuitBreakerUpdate {
        failure_threshold: Some(1),
        ..Default::default()
    });
    let status = router.update_provider_config("a", update).unwrap();
    assert_eq!(status.circuit_breaker.failure_threshold, 1);
    assert_eq!(status.circuit_breaker.open_duration_ms, 1_000);

    assert!(router.execute(request()).await.is_err());
    assert_eq!(
        router.get_provider_status("a").unwrap().state,
        BreakerState::Open
    );

    let invalid = ProviderConfigUpdate::new().circuit_breaker(CircuitBreakerUpdate {
        open_duration_ms: Some(0),
        ..Default::default()
    });
    assert!(matches!(
        router.update_provider_config("a", invalid),
        Err(RouterError::InvalidUpdate(_))
    ));
    assert_eq!(
        router
            .get_provider_status("a")
            .unwrap()
            .circuit_breaker
            .open_duration_ms,
        1_000
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_pending_backoff() {
    let a = ScriptedClient::failing("a", ProviderError::server(502, "bad gateway"));
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)
            .with_retry(retry(5, 1_000))
            .with_circuit_breaker(breaker(10))]),
        &[a.clone()],
    );

    let err = router
        .execute_with_timeout(request(), Duration::from_millis(1_500))
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Timeout(d) if d == Duration::from_millis(1_500)));
    // Attempts at t=0 and t=1000; the next one would start at t=3000
    assert_eq!(a.calls(), 2);
    assert_eq!(router.get_provider_status("a").unwrap().total_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_configured_deadline_applies_to_execute() {
    let a = ScriptedClient::slow("a", Duration::from_secs(5), Vec::new());
    let config = RouterConfig::new(vec![descriptor("a", 1, 1.0)])
        .with_request_timeout(Duration::from_secs(2));
    let router = router(config, &[a.clone()]);

    assert!(matches!(
        router.execute(request()).await,
        Err(RouterError::Timeout(_))
    ));

    // The abandoned attempt never completed, so nothing was recorded
    let status = router.get_provider_status("a").unwrap();
    assert_eq!(status.total_successes, 0);
    assert_eq!(status.state, BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_moves_to_next_candidate() {
    let a = ScriptedClient::failing(
        "a",
        ProviderError::Authentication {
            message: "bad key".into(),
        },
    );
    let b = ScriptedClient::succeeding("b");
    let router = router(
        RouterConfig::new(vec![
            descriptor("a", 1, 1.0).with_retry(retry(3, 100)),
            descriptor("b", 1, 1.0),
        ]),
        &[a.clone(), b.clone()],
    );

    let response = router.execute(request()).await.unwrap();
    assert_eq!(response.provider, "b");
    assert_eq!(response.metadata["fallback_used"], true);
    assert_eq!(response.metadata["attempts"], 2);
    assert_eq!(a.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_hint_stretches_backoff() {
    let a = ScriptedClient::scripted(
        "a",
        vec![Err(ProviderError::RateLimit {
            retry_after: Some(Duration::from_millis(300)),
        })],
    );
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0).with_retry(retry(2, 100))]),
        &[a.clone()],
    );

    router.execute(request()).await.unwrap();
    let times = a.call_times();
    assert_eq!(times[1] - times[0], Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_response_is_enriched() {
    let a = ScriptedClient::succeeding("a");
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)]),
        &[a.clone()],
    );

    let response = router.execute(request()).await.unwrap();

    // 30 prompt chars and 13 completion chars at four chars per token
    assert_eq!(response.usage, TokenUsage::new(8, 4));
    assert_eq!(response.model, MODEL);
    assert_eq!(response.metadata["fallback_used"], false);
    assert_eq!(response.metadata["attempts"], 1);

    let cost = response.metadata["estimated_cost_usd"].as_f64().unwrap();
    assert!((cost - 0.012).abs() < 1e-9);

    let request_id = response.metadata["request_id"].as_str().unwrap();
    let sent = a.last_request().unwrap();
    assert_eq!(sent.metadata["request_id"].as_str(), Some(request_id));
}

#[tokio::test(start_paused = true)]
async fn test_reported_usage_is_kept() {
    let a = ScriptedClient::with_reported_usage("a", TokenUsage::new(100, 50));
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)]),
        &[a.clone()],
    );

    let response = router.execute(request()).await.unwrap();
    assert_eq!(response.usage.total_tokens, 150);
}

#[tokio::test(start_paused = true)]
async fn test_defaults_and_max_tokens_clamp() {
    let a = ScriptedClient::succeeding("a");
    let router = router(
        RouterConfig::new(vec![descriptor("a", 1, 1.0)]),
        &[a.clone()],
    );

    router
        .execute(CompletionRequest::new("hi").with_max_tokens(5_000))
        .await
        .unwrap();

    let sent = a.last_request().unwrap();
    assert_eq!(sent.model.as_deref(), Some(MODEL));
    assert_eq!(sent.params.max_tokens, Some(1_000));
    assert_eq!(sent.params.temperature, Some(0.7));

    router
        .execute(CompletionRequest::new("hi").with_temperature(0.0))
        .await
        .unwrap();
    let sent = a.last_request().unwrap();
    assert_eq!(sent.params.temperature, Some(0.0));
    assert_eq!(sent.params.max_tokens, None);
}

#[tokio::test(start_paused = true)]
async fn test_health_and_status_snapshots() {
    let a = ScriptedClient::failing("a", ProviderError::Timeout);
    let b = ScriptedClient::succeeding("b");
    let router = router(
        RouterConfig::new(vec![
            descriptor("a", 1, 1.0).with_circuit_breaker(breaker(1)),
            descriptor("b", 1, 1.0),
        ]),
        &[a.clone(), b.clone()],
    );

    let health = router.health();
    assert_eq!((health.healthy_count, health.total), (2, 2));

    router.execute(request()).await.unwrap();

    let health = router.health();
    assert_eq!((health.healthy_count, health.total), (1, 2));
    assert!(health.is_healthy());
    let a_health = health.providers.iter().find(|p| p.name == "a").unwrap();
    assert!(!a_health.selectable);
    assert_eq!(a_health.state, BreakerState::Open);

    let statuses = router.get_all_providers_status();
    assert_eq!(statuses.len(), 2);
    let json = serde_json::to_value(&statuses[0]).unwrap();
    assert_eq!(json["name"], "a");
    assert_eq!(json["state"], "open");
    assert_eq!(json["models"][0], MODEL);
    assert!(json["last_used"].is_string());
}
