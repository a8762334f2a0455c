//! The completion router
//!
//! `execute` resolves the model, filters and orders candidates, then walks
//! them in order with a per-candidate retry loop. The first success wins.
//! Breaker bookkeeping happens after every attempt, so a provider that
//! keeps failing drops out of later candidate sets on its own.

use crate::config::{
    ConfigValidator, DefaultConfig, LoadBalancing, ModelSpec, RetryConfig, RouterConfig,
};
use crate::http::REQUEST_ID_KEY;
use crate::protocol::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::providers::{ClientRegistry, ProviderError};
use crate::routing::error::{RouterError, RouterResult};
use crate::routing::retry::next_delay;
use crate::routing::state::{ProbeGuard, ProviderEntry};
use crate::routing::status::{HealthReport, ProviderConfigUpdate, ProviderStatus};
use crate::routing::strategy::{order_candidates, Candidate, RotationCursor};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Routes completion requests across providers
pub struct Router {
    providers: Vec<Arc<ProviderEntry>>,
    strategy: LoadBalancing,
    default_model: Option<String>,
    defaults: DefaultConfig,
    request_timeout: Duration,
    cursor: RotationCursor,
}

/// A candidate admitted for one request
struct Selected {
    entry: Arc<ProviderEntry>,
    model: ModelSpec,
    probe: Option<ProbeGuard>,
}

/// Terminal outcome of one candidate's retry loop
struct CandidateFailure {
    error: ProviderError,
    attempts: u32,
}

impl Router {
    /// Validate the configuration and instantiate a client for every enabled
    /// provider. Providers whose client fails to build are logged and left
    /// out; the router fails only if none remain.
    pub fn create(config: RouterConfig, registry: &ClientRegistry) -> RouterResult<Self> {
        ConfigValidator::new()
            .validate(&config)
            .map_err(|e| RouterError::configuration(e.to_string()))?;

        let RouterConfig {
            providers: descriptors,
            routing,
            defaults,
            ..
        } = config;

        let mut providers = Vec::new();
        for descriptor in descriptors.into_iter().filter(|d| d.enabled) {
            match registry.create(&descriptor) {
                Ok(client) => {
                    info!(
                        provider = %descriptor.name,
                        category = %descriptor.category,
                        priority = descriptor.priority,
                        models = descriptor.models.len(),
                        "Provider initialized"
                    );
                    providers.push(Arc::new(ProviderEntry::new(descriptor, client)));
                }
                Err(e) => {
                    error!(
                        provider = %descriptor.name,
                        error = %e,
                        "Failed to initialize provider, excluding it"
                    );
                }
            }
        }

        if providers.is_empty() {
            return Err(RouterError::configuration(
                "no provider could be initialized",
            ));
        }

        info!(
            providers = providers.len(),
            strategy = %routing.strategy,
            "Router created"
        );

        Ok(Self {
            providers,
            strategy: routing.strategy,
            default_model: routing.default_model,
            defaults,
            request_timeout: Duration::from_millis(routing.request_timeout_ms),
            cursor: RotationCursor::new(),
        })
    }

    pub fn strategy(&self) -> LoadBalancing {
        self.strategy
    }

    /// Names of all initialized providers, in configuration order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// Route a request under the configured deadline
    pub async fn execute(&self, request: CompletionRequest) -> RouterResult<CompletionResponse> {
        self.execute_with_timeout(request, self.request_timeout).await
    }

    /// Route a request to the named providers only
    pub async fn execute_with_providers<I, S>(
        &self,
        mut request: CompletionRequest,
        preferred: I,
    ) -> RouterResult<CompletionResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        request.preferred_providers = preferred.into_iter().map(Into::into).collect();
        self.execute(request).await
    }

    /// Route a request, aborting with `Timeout` once `timeout` elapses,
    /// including mid-attempt and mid-backoff
    pub async fn execute_with_timeout(
        &self,
        request: CompletionRequest,
        timeout: Duration,
    ) -> RouterResult<CompletionResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("route", %request_id);

        async {
            match tokio::time::timeout(timeout, self.route(request, request_id)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(?timeout, "Request deadline exceeded");
                    Err(RouterError::Timeout(timeout))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn route(
        &self,
        request: CompletionRequest,
        request_id: Uuid,
    ) -> RouterResult<CompletionResponse> {
        let model = self.resolve_model(&request)?;
        let selection = self.select(&model, &request.preferred_providers);

        if selection.is_empty() {
            warn!(%model, "No provider available");
            return Err(RouterError::NoProviderAvailable { model });
        }

        debug!(
            %model,
            candidates = ?selection.iter().map(|s| s.entry.name.as_str()).collect::<Vec<_>>(),
            "Candidates ordered"
        );

        let candidate_count = selection.len();
        let mut errors = Vec::with_capacity(candidate_count);
        let mut total_attempts = 0;

        for (index, selected) in selection.into_iter().enumerate() {
            let entry = &selected.entry;
            let probe = selected.probe.as_ref();

            // Earlier candidates may have run long enough for the breaker to move
            if !entry.may_attempt(probe) {
                debug!(provider = %entry.name, "Circuit changed since selection, skipping");
                continue;
            }

            let retry = entry.descriptor.read().retry.clone();
            let prepared = self.prepare_request(&request, &selected.model, request_id);

            match self.try_candidate(entry, probe, &prepared, &retry).await {
                Ok((response, attempts)) => {
                    total_attempts += attempts;
                    let mut response = self.enrich(response, entry, &selected.model, &prepared);
                    response
                        .metadata
                        .insert("attempts".to_string(), json!(total_attempts));
                    response
                        .metadata
                        .insert("fallback_used".to_string(), json!(index > 0));
                    response
                        .metadata
                        .insert(REQUEST_ID_KEY.to_string(), json!(request_id.to_string()));

                    info!(
                        provider = %entry.name,
                        model = %response.model,
                        attempts = total_attempts,
                        fallback_used = index > 0,
                        "Completion succeeded"
                    );
                    return Ok(response);
                }
                Err(failure) => {
                    total_attempts += failure.attempts;
                    if index + 1 < candidate_count {
                        info!(
                            provider = %entry.name,
                            error = %failure.error,
                            "Provider exhausted, falling back"
                        );
                    }
                    errors.push((entry.name.clone(), failure.error));
                }
            }
        }

        if errors.is_empty() {
            warn!(%model, "Every candidate's circuit opened before it was tried");
            return Err(RouterError::NoProviderAvailable { model });
        }

        error!(
            attempts = total_attempts,
            providers = errors.len(),
            "All providers failed"
        );
        Err(RouterError::AllProvidersFailed { errors })
    }

    fn resolve_model(&self, request: &CompletionRequest) -> RouterResult<String> {
        request
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.default_model.as_deref())
            .map(str::to_string)
            .ok_or_else(|| RouterError::validation("request has no model and no default is configured"))
    }

    /// Filter to eligible providers, admit them through their breakers and
    /// order them with the configured strategy
    fn select(&self, model: &str, preferred: &[String]) -> Vec<Selected> {
        let mut candidates = Vec::new();
        let mut admitted = Vec::new();

        for entry in &self.providers {
            let (spec, priority) = {
                let descriptor = entry.descriptor.read();
                if !descriptor.enabled {
                    continue;
                }
                if !preferred.is_empty() && !preferred.iter().any(|p| *p == descriptor.name) {
                    continue;
                }
                let Some(spec) = descriptor.model(model) else {
                    continue;
                };
                (spec.clone(), descriptor.priority)
            };

            let Some(probe) = entry.admit() else {
                debug!(provider = %entry.name, "Skipping provider with open circuit");
                continue;
            };

            candidates.push(Candidate::new(
                entry.name.clone(),
                priority,
                spec.blended_cost(),
            ));
            admitted.push(Some(Selected {
                entry: Arc::clone(entry),
                model: spec,
                probe,
            }));
        }

        order_candidates(&candidates, self.strategy, &self.cursor)
            .into_iter()
            .filter_map(|i| admitted[i].take())
            .collect()
    }

    /// Resolve model and sampling defaults for one candidate
    fn prepare_request(
        &self,
        request: &CompletionRequest,
        model: &ModelSpec,
        request_id: Uuid,
    ) -> CompletionRequest {
        let mut prepared = request.clone();
        prepared.model = Some(model.name.clone());

        if prepared.params.temperature.is_none() {
            prepared.params.temperature = self.defaults.temperature;
        }
        prepared.params.max_tokens = prepared
            .params
            .max_tokens
            .or(self.defaults.max_tokens)
            .map(|max| max.min(model.max_tokens));

        prepared
            .metadata
            .insert(REQUEST_ID_KEY.to_string(), json!(request_id.to_string()));
        prepared
    }

    async fn try_candidate(
        &self,
        entry: &ProviderEntry,
        probe: Option<&ProbeGuard>,
        request: &CompletionRequest,
        retry: &RetryConfig,
    ) -> Result<(CompletionResponse, u32), CandidateFailure> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(provider = %entry.name, attempt, "Attempting completion");

            let error = match entry.client.create_completion(request).await {
                Ok(response) => {
                    entry.record_success();
                    return Ok((response, attempt));
                }
                Err(error) => error,
            };

            entry.record_failure();
            warn!(
                provider = %entry.name,
                attempt,
                max_attempts = retry.max_attempts,
                retryable = error.is_retryable(),
                error = %error,
                "Completion attempt failed"
            );

            if !error.is_retryable()
                || attempt >= retry.max_attempts
                || !entry.may_attempt(probe)
            {
                return Err(CandidateFailure {
                    error,
                    attempts: attempt,
                });
            }

            let delay = next_delay(retry, attempt, &error);
            debug!(provider = %entry.name, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::time::sleep(delay).await;

            // Another request may have opened or half-opened the circuit meanwhile
            if !entry.may_attempt(probe) {
                debug!(provider = %entry.name, attempt, "Circuit moved during backoff, giving up");
                return Err(CandidateFailure {
                    error,
                    attempts: attempt,
                });
            }
        }
    }

    /// Attribute the response and fill in usage the backend left out
    fn enrich(
        &self,
        mut response: CompletionResponse,
        entry: &ProviderEntry,
        model: &ModelSpec,
        request: &CompletionRequest,
    ) -> CompletionResponse {
        response.provider = entry.name.clone();
        if response.model.is_empty() {
            response.model = model.name.clone();
        }

        if response.usage.is_empty() {
            let mut prompt_tokens = entry.client.estimate_tokens(&request.prompt);
            if let Some(system) = &request.system {
                prompt_tokens = prompt_tokens.saturating_add(entry.client.estimate_tokens(system));
            }
            let completion_tokens = entry.client.estimate_tokens(&response.text);
            response.usage = TokenUsage::new(prompt_tokens, completion_tokens);
        }

        let cost = model.estimate_cost(response.usage.prompt_tokens, response.usage.completion_tokens);
        response
            .metadata
            .insert("estimated_cost_usd".to_string(), json!(cost));
        response
    }

    fn entry(&self, name: &str) -> Option<&Arc<ProviderEntry>> {
        self.providers.iter().find(|p| p.name == name)
    }

    fn snapshot(&self, entry: &ProviderEntry) -> ProviderStatus {
        let descriptor = entry.descriptor.read().clone();
        let state = entry.state.lock().clone();

        ProviderStatus {
            name: entry.name.clone(),
            category: descriptor.category,
            enabled: descriptor.enabled,
            priority: descriptor.priority,
            models: descriptor.models.iter().map(|m| m.name.clone()).collect(),
            state: state.breaker,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            last_state_change: state.last_state_change_at,
            last_used: state.last_used_at,
            probe_in_flight: state.probe_in_flight,
            rotation_credit: self.cursor.credit(&entry.name),
            circuit_breaker: descriptor.circuit_breaker,
            retry: descriptor.retry,
        }
    }

    /// Snapshot of one provider, `None` if it is not known to this router
    pub fn get_provider_status(&self, name: &str) -> Option<ProviderStatus> {
        self.entry(name).map(|entry| self.snapshot(entry))
    }

    pub fn get_all_providers_status(&self) -> Vec<ProviderStatus> {
        self.providers.iter().map(|entry| self.snapshot(entry)).collect()
    }

    /// Merge `update` into a live provider. The merged descriptor is
    /// validated before it replaces the old one; in-flight requests keep
    /// the values they already read.
    pub fn update_provider_config(
        &self,
        name: &str,
        update: ProviderConfigUpdate,
    ) -> RouterResult<ProviderStatus> {
        let entry = self
            .entry(name)
            .ok_or_else(|| RouterError::ProviderNotFound(name.to_string()))?;

        {
            let mut descriptor = entry.descriptor.write();
            let updated = update.apply_to(&descriptor).inspect_err(|e| {
                warn!(provider = %name, error = %e, "Rejected provider update");
            })?;
            *descriptor = updated;
        }

        info!(provider = %name, ?update, "Provider configuration updated");
        Ok(self.snapshot(entry))
    }

    /// Per-provider selectability and the healthy count
    pub fn health(&self) -> HealthReport {
        HealthReport::from_statuses(&self.get_all_providers_status())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("providers", &self.provider_names())
            .field("strategy", &self.strategy)
            .field("default_model", &self.default_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
