//! Recovery/Retry Orchestrator
//!
//! `FailoverRouter` drives one request through the attempt loop:
//! - Back off before every attempt but the first
//! - Pick a provider (rules → scoring → selection) among those whose breaker
//!   admits traffic, or reuse the current one on a same-provider retry while
//!   the registry still lists it
//! - Never go back to a provider that failed with a non-retryable type
//! - Call it under the per-attempt deadline
//! - On failure classify, record and act: retry, switch, or fail fast
//!
//! Only exhaustion, fail-fast and "nothing viable" reach the caller.

use crate::circuit_breaker::{BreakerKey, BreakerStats, CircuitBreakerManager, TransitionHook};
use crate::config::FailoverConfig;
use crate::context::{RoutingContext, RoutingStrategy};
use crate::error::{Result, RoutingError};
use crate::failure::{FailoverAction, FailureDetector, FailureRecord, FailureType};
use crate::history::{FailureHistory, FailureStats};
use crate::learning::{LearningTracker, RoutingDecisionRecord, RoutingStats};
use crate::outcome::{AttemptOutcome, OutcomeObserver, RequestOutcome};
use crate::preserver::{ContextPreserver, FailoverProvenance};
use crate::rules::{RoutingRule, RuleEngine};
use crate::scoring::{ScoringEngine, WorkloadProfile};
use crate::selection::select_provider;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard_core::normalized::{CompletionRequest, CompletionResponse, Message};
use switchyard_core::{Provider, ProviderError, ProviderRegistry, ProviderSnapshot, TenantId};
use tokio::time::Instant;

/// A provider picked for an attempt, with the snapshot it was scored on
struct Selected {
    provider: Arc<dyn Provider>,
    snapshot: ProviderSnapshot,
}

/// Bookkeeping for one request across attempts
struct RequestTrace {
    request_id: String,
    tenant: TenantId,
    workload: Option<String>,
    started: Instant,
    attempts: Vec<AttemptOutcome>,
    trail: Vec<FailureRecord>,
    breaker_engaged: bool,
}

impl RequestTrace {
    fn new(request: &CompletionRequest, context: &RoutingContext) -> Self {
        Self {
            request_id: request.request_id.clone(),
            tenant: context.tenant.clone(),
            workload: context.workload.clone(),
            started: Instant::now(),
            attempts: Vec::new(),
            trail: Vec::new(),
            breaker_engaged: false,
        }
    }

    fn outcome(&mut self, success: bool) -> RequestOutcome {
        RequestOutcome {
            request_id: self.request_id.clone(),
            tenant: self.tenant.clone(),
            workload: self.workload.clone(),
            attempts: std::mem::take(&mut self.attempts),
            total_latency: self.started.elapsed(),
            breaker_engaged: self.breaker_engaged,
            success,
        }
    }
}

/// Result of pinging one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealthCheck {
    pub healthy: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

/// Configuration values worth showing next to the live stats
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub max_retry_attempts: u32,
    pub retry_delays_secs: Vec<f64>,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration_secs: f64,
    pub context_preservation: bool,
    pub default_strategy: RoutingStrategy,
}

/// Serializable view of the whole router
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub config: ConfigSummary,
    pub circuit_breakers: Vec<BreakerStats>,
    pub failures: FailureStats,
    pub routing: RoutingStats,
    pub active_conversations: usize,
}

pub struct FailoverRouter {
    registry: Arc<dyn ProviderRegistry>,
    config: FailoverConfig,
    rules: RuleEngine,
    scoring: ScoringEngine,
    breakers: CircuitBreakerManager,
    detector: FailureDetector,
    history: FailureHistory,
    tracker: LearningTracker,
    preserver: ContextPreserver,
    observers: Vec<Arc<dyn OutcomeObserver>>,
    rng: Mutex<StdRng>,
}

impl FailoverRouter {
    pub fn builder(registry: Arc<dyn ProviderRegistry>) -> FailoverRouterBuilder {
        FailoverRouterBuilder::new(registry)
    }

    /// Route `request` and return the first successful response
    pub async fn execute(
        &self,
        request: CompletionRequest,
        context: RoutingContext,
    ) -> Result<CompletionResponse> {
        let strategy = context.strategy.unwrap_or(self.config.default_strategy);
        let tenant = context.tenant.clone();
        let mut trace = RequestTrace::new(&request, &context);
        let mut ctx = context;

        let mut current: Option<Selected> = None;
        let mut switch_from: Option<FailoverProvenance> = None;
        let mut attempt_request = request.clone();
        let mut attempts_on_provider = 0u32;
        let mut last: Option<(String, FailureType, ProviderError)> = None;
        // Providers that failed in a way retrying can't fix
        let mut spent: HashSet<String> = HashSet::new();

        for attempt in 0..self.config.max_retry_attempts {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt, last.as_ref().map(|(_, ft, _)| *ft));
                if !delay.is_zero() {
                    tracing::debug!(
                        request_id = %request.request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before next attempt"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            // Another request may have opened the breaker while we slept, or
            // the registry may have dropped the provider
            if let Some(selected) = &current
                && let Some(reason) = self.retry_blocker(&selected.snapshot.id, &tenant)
            {
                let provider_id = selected.snapshot.id.clone();
                tracing::info!(
                    provider = %provider_id,
                    reason,
                    "Provider unavailable, switching instead of retrying"
                );
                if reason == "circuit_open" {
                    trace.breaker_engaged = true;
                }
                ctx = ctx.advance(&provider_id);
                switch_from = last.as_ref().map(|(provider, failure_type, _)| FailoverProvenance {
                    original_provider: provider.clone(),
                    failure_type: *failure_type,
                    attempt_count: attempt,
                    request_id: request.request_id.clone(),
                });
                current = None;
            }

            let selected = match current.take() {
                Some(selected) => selected,
                None => {
                    let Some(selected) = self.route(&request, &ctx, strategy, &spent, &mut trace)
                    else {
                        tracing::warn!(
                            request_id = %request.request_id,
                            tenant = %tenant,
                            attempt,
                            "No viable provider"
                        );
                        self.emit(&trace.outcome(false));
                        if let Some((provider, failure_type, last_error)) = last
                            && !failure_type.is_retryable_on_same_provider()
                        {
                            return Err(RoutingError::FailFast {
                                provider,
                                failure_type,
                                last_error,
                                trail: trace.trail,
                            });
                        }
                        return Err(RoutingError::NoViableProvider {
                            tenant,
                            trail: trace.trail,
                        });
                    };
                    attempts_on_provider = 0;
                    attempt_request = match switch_from.take() {
                        Some(provenance) => {
                            self.preserver
                                .adapt_request(&request, &selected.snapshot, &provenance)
                        }
                        None => request.clone(),
                    };
                    if ctx.is_retry()
                        && let Some(conversation_id) = ctx.conversation_id.as_deref()
                    {
                        self.preserver
                            .transfer_context(conversation_id, &selected.snapshot);
                    }
                    selected
                }
            };

            let provider_id = selected.snapshot.id.clone();
            let key = BreakerKey::new(&provider_id, &tenant);
            let number = attempt + 1;

            tracing::debug!(
                request_id = %request.request_id,
                provider = %provider_id,
                model = %attempt_request.model,
                attempt = number,
                "Attempting request to provider"
            );

            let call_started = Instant::now();
            let result = match tokio::time::timeout(
                self.config.attempt_timeout,
                selected.provider.execute(attempt_request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.config.attempt_timeout)),
            };
            let latency = call_started.elapsed();

            match result {
                Ok(response) => {
                    self.breakers.record_success(&key);
                    self.tracker.record_outcome(
                        &provider_id,
                        &tenant,
                        ctx.workload.as_deref(),
                        true,
                        latency,
                    );
                    trace.attempts.push(AttemptOutcome {
                        provider: provider_id.clone(),
                        attempt: number,
                        latency,
                        failure_type: None,
                        action: None,
                    });

                    tracing::info!(
                        request_id = %request.request_id,
                        provider = %provider_id,
                        attempt = number,
                        latency_ms = latency.as_millis() as u64,
                        "Request succeeded"
                    );
                    self.emit(&trace.outcome(true));
                    return Ok(response);
                }
                Err(error) => {
                    let record = self.detector.record(
                        &request.request_id,
                        &provider_id,
                        &tenant,
                        &error,
                        number,
                    );
                    let failure_type = record.failure_type;
                    self.history.push(record.clone());
                    trace.trail.push(record);

                    let opened = self.breakers.record_failure(&key);
                    trace.breaker_engaged |= opened;
                    self.tracker.record_outcome(
                        &provider_id,
                        &tenant,
                        ctx.workload.as_deref(),
                        false,
                        latency,
                    );

                    attempts_on_provider += 1;
                    if !failure_type.is_retryable_on_same_provider() {
                        spent.insert(provider_id.clone());
                    }
                    let decision = self.detector.decide(failure_type, attempts_on_provider, number);
                    let action = if opened && decision != FailoverAction::FailFast {
                        FailoverAction::CircuitBreak
                    } else {
                        decision
                    };

                    tracing::warn!(
                        request_id = %request.request_id,
                        provider = %provider_id,
                        attempt = number,
                        failure_type = %failure_type,
                        action = action.as_str(),
                        error = %error,
                        "Request failed"
                    );
                    trace.attempts.push(AttemptOutcome {
                        provider: provider_id.clone(),
                        attempt: number,
                        latency,
                        failure_type: Some(failure_type),
                        action: Some(action),
                    });

                    match action {
                        FailoverAction::RetrySame => current = Some(selected),
                        FailoverAction::SwitchProvider | FailoverAction::CircuitBreak => {
                            ctx = ctx.advance(&provider_id);
                            switch_from = Some(FailoverProvenance {
                                original_provider: provider_id.clone(),
                                failure_type,
                                attempt_count: number,
                                request_id: request.request_id.clone(),
                            });
                        }
                        FailoverAction::FailFast => {
                            self.emit(&trace.outcome(false));
                            return Err(RoutingError::FailFast {
                                provider: provider_id,
                                failure_type,
                                last_error: error,
                                trail: trace.trail,
                            });
                        }
                    }
                    last = Some((provider_id, failure_type, error));
                }
            }
        }

        self.emit(&trace.outcome(false));
        match last {
            Some((provider, _, last_error)) => {
                tracing::error!(
                    request_id = %request.request_id,
                    attempts = self.config.max_retry_attempts,
                    provider = %provider,
                    "All attempts failed"
                );
                Err(RoutingError::Exhausted {
                    attempts: self.config.max_retry_attempts,
                    provider,
                    last_error,
                    trail: trace.trail,
                })
            }
            None => Err(RoutingError::NoViableProvider {
                tenant,
                trail: trace.trail,
            }),
        }
    }

    /// Wait before attempt `attempt` (0-based, > 0): the table delay for
    /// `attempt - 1`, stretched to the prior failure type's retry delay
    pub fn backoff_delay(&self, attempt: u32, prior: Option<FailureType>) -> Duration {
        let table = self
            .config
            .table_delay(attempt.saturating_sub(1) as usize);
        let floor = prior
            .map(|failure_type| self.config.policy_for(failure_type).retry_delay)
            .unwrap_or_default();
        table.max(floor)
    }

    /// Why the current provider can't take a same-provider retry, if it can't
    fn retry_blocker(&self, provider_id: &str, tenant: &TenantId) -> Option<&'static str> {
        if self.breakers.is_open(&BreakerKey::new(provider_id, tenant)) {
            return Some("circuit_open");
        }
        let listed = self
            .registry
            .available_providers(tenant)
            .iter()
            .any(|provider| provider.id() == provider_id);
        (!listed).then_some("unavailable")
    }

    /// Rules → scoring → selection over providers whose breaker admits
    /// traffic, skipping those in `spent`
    fn route(
        &self,
        request: &CompletionRequest,
        context: &RoutingContext,
        strategy: RoutingStrategy,
        spent: &HashSet<String>,
        trace: &mut RequestTrace,
    ) -> Option<Selected> {
        let routing_started = Instant::now();

        let mut rejected = 0usize;
        let available: Vec<Arc<dyn Provider>> = self
            .registry
            .available_providers(&context.tenant)
            .into_iter()
            .filter(|provider| !spent.contains(provider.id()))
            .filter(|provider| {
                let open = self
                    .breakers
                    .is_open(&BreakerKey::new(provider.id(), &context.tenant));
                if open {
                    tracing::debug!(
                        provider = provider.id(),
                        "Circuit breaker is open, skipping provider"
                    );
                    rejected += 1;
                }
                !open
            })
            .collect();
        if rejected > 0 {
            trace.breaker_engaged = true;
        }
        if available.is_empty() {
            return None;
        }

        let snapshots: Vec<ProviderSnapshot> = available
            .iter()
            .map(|provider| ProviderSnapshot::capture(provider.as_ref()))
            .collect();
        let profile = context
            .workload
            .as_deref()
            .and_then(|workload| self.scoring.profile(workload));
        let candidates = self.rules.filter(&snapshots, context, profile);
        let scores = self
            .scoring
            .score(&candidates, request, context, strategy, &self.tracker);

        let chosen = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            select_provider(&scores, context, &mut *rng).ok()?
        };
        let index = snapshots.iter().position(|s| s.id == chosen.provider)?;

        let routing_time = routing_started.elapsed();
        tracing::info!(
            request_id = %request.request_id,
            provider = %chosen.provider,
            score = chosen.total,
            strategy = %strategy,
            retry = context.retry_count,
            "Route decision made"
        );
        self.tracker.record_decision(RoutingDecisionRecord {
            request_id: request.request_id.clone(),
            tenant: context.tenant.clone(),
            workload: context.workload.clone(),
            strategy,
            selected: chosen.provider.clone(),
            scores,
            routing_time_ms: routing_time.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        });

        Some(Selected {
            provider: available[index].clone(),
            snapshot: snapshots[index].clone(),
        })
    }

    fn emit(&self, outcome: &RequestOutcome) {
        for observer in &self.observers {
            observer.on_request_complete(outcome);
        }
    }

    /// Ping every available provider with a one-token request
    pub async fn health_check_all(&self, tenant: &TenantId) -> BTreeMap<String, ProviderHealthCheck> {
        let providers = self.registry.available_providers(tenant);
        let checks = providers.iter().map(|provider| async move {
            let model = provider
                .capabilities()
                .default_model()
                .map(|m| m.name.clone())
                .unwrap_or_default();
            let ping = CompletionRequest::new(model, vec![Message::user("ping")]).with_max_tokens(1);

            let started = Instant::now();
            let result =
                match tokio::time::timeout(self.config.attempt_timeout, provider.execute(ping)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.config.attempt_timeout)),
                };
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let check = match result {
                Ok(_) => ProviderHealthCheck {
                    healthy: true,
                    latency_ms,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(provider = provider.id(), error = %e, "Health check failed");
                    ProviderHealthCheck {
                        healthy: false,
                        latency_ms,
                        error: Some(e.to_string()),
                    }
                }
            };
            (provider.id().to_string(), check)
        });

        futures::future::join_all(checks).await.into_iter().collect()
    }

    pub fn system_stats(&self) -> SystemStats {
        SystemStats {
            config: ConfigSummary {
                max_retry_attempts: self.config.max_retry_attempts,
                retry_delays_secs: self
                    .config
                    .retry_delays
                    .iter()
                    .map(|d| d.as_secs_f64())
                    .collect(),
                failure_threshold: self.config.circuit_breaker.failure_threshold,
                success_threshold: self.config.circuit_breaker.success_threshold,
                open_duration_secs: self.config.circuit_breaker.open_duration.as_secs_f64(),
                context_preservation: self.config.enable_context_preservation,
                default_strategy: self.config.default_strategy,
            },
            circuit_breakers: self.breakers.stats(),
            failures: self.history.stats(),
            routing: self.tracker.routing_stats(),
            active_conversations: self.preserver.len(),
        }
    }

    /// Administratively close the breaker for (provider, tenant)
    pub fn reset_circuit_breaker(&self, provider: &str, tenant: &TenantId) -> bool {
        self.breakers.reset(&BreakerKey::new(provider, tenant))
    }

    /// Drop failure records older than `age`
    pub fn clear_failure_history(&self, age: Duration) -> usize {
        self.history.clear_older_than(age)
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    pub fn tracker(&self) -> &LearningTracker {
        &self.tracker
    }

    pub fn history(&self) -> &FailureHistory {
        &self.history
    }

    pub fn preserver(&self) -> &ContextPreserver {
        &self.preserver
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }
}

pub struct FailoverRouterBuilder {
    registry: Arc<dyn ProviderRegistry>,
    config: FailoverConfig,
    rules: Vec<RoutingRule>,
    profiles: HashMap<String, WorkloadProfile>,
    observers: Vec<Arc<dyn OutcomeObserver>>,
    seed: Option<u64>,
}

impl FailoverRouterBuilder {
    fn new(registry: Arc<dyn ProviderRegistry>) -> Self {
        Self {
            registry,
            config: FailoverConfig::default(),
            rules: Vec::new(),
            profiles: HashMap::new(),
            observers: Vec::new(),
            seed: None,
        }
    }

    pub fn config(mut self, config: FailoverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(mut self, rules: Vec<RoutingRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add or replace workload profiles on top of the built-in ones
    pub fn workload_profiles(mut self, profiles: HashMap<String, WorkloadProfile>) -> Self {
        self.profiles.extend(profiles);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Seed the selection RNG for reproducible draws
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<FailoverRouter> {
        self.config
            .validate()
            .map_err(switchyard_core::Error::ConfigValidation)?;

        let mut breakers = CircuitBreakerManager::new(self.config.circuit_breaker.clone());
        if !self.observers.is_empty() {
            let observers = self.observers.clone();
            let hook: TransitionHook = Arc::new(move |key, from, to| {
                for observer in &observers {
                    observer.on_breaker_transition(key, from, to);
                }
            });
            breakers = breakers.with_transition_hook(hook);
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(FailoverRouter {
            registry: self.registry,
            rules: RuleEngine::with_rules(self.rules),
            scoring: ScoringEngine::new(
                self.config.cost_ceiling,
                self.config.default_estimated_tokens,
            )
            .with_profiles(self.profiles),
            breakers,
            detector: FailureDetector::new(&self.config),
            history: FailureHistory::new(self.config.max_failure_history),
            tracker: LearningTracker::new(
                self.config.performance_window,
                self.config.max_routing_history,
            ),
            preserver: ContextPreserver::new(&self.config),
            observers: self.observers,
            rng: Mutex::new(rng),
            config: self.config,
        })
    }
}
