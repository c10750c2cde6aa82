//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for the failover router:
//! - Request counts (total, success, failure by tenant and provider)
//! - Request and per-attempt latency histograms
//! - Attempts per request
//! - Failover trigger counts
//! - Circuit breaker state and transitions
//!
//! [`Metrics`] implements [`OutcomeObserver`], so registering it on the
//! router builder is all the wiring needed.

use prometheus::{
    CounterVec, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use switchyard_routing::{BreakerKey, CircuitState, OutcomeObserver, RequestOutcome};

/// Label used when a request failed before any provider was called
const NO_PROVIDER: &str = "none";

/// Metrics collector for Switchyard
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    // Request counters
    /// Total requests routed
    pub requests_total: CounterVec,
    /// Successful requests, by the provider that served them
    pub requests_success: CounterVec,
    /// Failed requests, by the last failure type seen
    pub requests_failure: CounterVec,

    // Latency histograms
    /// End-to-end request duration including backoff
    pub request_duration_seconds: HistogramVec,
    /// Single provider call duration
    pub attempt_duration_seconds: HistogramVec,
    /// Provider calls made per request
    pub attempts_per_request: Histogram,

    // Failure metrics
    /// Failed provider calls by failure type
    pub provider_failures: CounterVec,
    /// Requests moved from one provider to another
    pub failover_triggered: CounterVec,

    // Circuit breaker metrics
    /// Circuit breaker state (0=closed, 1=open, 2=half-open)
    pub circuit_breaker_state: GaugeVec,
    /// Circuit breaker state changes
    pub circuit_breaker_transitions: CounterVec,
    /// Requests during which a breaker opened or rejected a candidate
    pub breaker_engaged: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Request counters
        let requests_total = CounterVec::new(
            Opts::new("switchyard_requests_total", "Total number of routed requests"),
            &["tenant", "workload"],
        )?;

        let requests_success = CounterVec::new(
            Opts::new(
                "switchyard_requests_success_total",
                "Total number of successful requests",
            ),
            &["tenant", "provider"],
        )?;

        let requests_failure = CounterVec::new(
            Opts::new(
                "switchyard_requests_failure_total",
                "Total number of failed requests",
            ),
            &["tenant", "provider", "failure_type"],
        )?;

        // Latency histograms
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_request_duration_seconds",
                "Request duration in seconds, including retries and backoff",
            )
            .buckets(vec![
                0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
            ]),
            &["tenant", "outcome"],
        )?;

        let attempt_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_attempt_duration_seconds",
                "Provider call duration in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["provider", "outcome"],
        )?;

        let attempts_per_request = Histogram::with_opts(
            HistogramOpts::new(
                "switchyard_attempts_per_request",
                "Number of provider calls made per request",
            )
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0]),
        )?;

        // Failure metrics
        let provider_failures = CounterVec::new(
            Opts::new(
                "switchyard_provider_failures_total",
                "Total number of failed provider calls",
            ),
            &["provider", "failure_type"],
        )?;

        let failover_triggered = CounterVec::new(
            Opts::new(
                "switchyard_failover_triggered_total",
                "Total number of provider switches",
            ),
            &["from_provider", "to_provider", "failure_type"],
        )?;

        // Circuit breaker metrics
        let circuit_breaker_state = GaugeVec::new(
            Opts::new(
                "switchyard_circuit_breaker_state",
                "Circuit breaker state (0=closed, 1=open, 2=half-open)",
            ),
            &["provider", "tenant"],
        )?;

        let circuit_breaker_transitions = CounterVec::new(
            Opts::new(
                "switchyard_circuit_breaker_transitions_total",
                "Total number of circuit breaker state transitions",
            ),
            &["provider", "tenant", "from_state", "to_state"],
        )?;

        let breaker_engaged = CounterVec::new(
            Opts::new(
                "switchyard_breaker_engaged_total",
                "Requests during which a circuit breaker opened or rejected a provider",
            ),
            &["tenant"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_success.clone()))?;
        registry.register(Box::new(requests_failure.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(attempt_duration_seconds.clone()))?;
        registry.register(Box::new(attempts_per_request.clone()))?;
        registry.register(Box::new(provider_failures.clone()))?;
        registry.register(Box::new(failover_triggered.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;
        registry.register(Box::new(breaker_engaged.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            requests_success,
            requests_failure,
            request_duration_seconds,
            attempt_duration_seconds,
            attempts_per_request,
            provider_failures,
            failover_triggered,
            circuit_breaker_state,
            circuit_breaker_transitions,
            breaker_engaged,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    /// Record everything a finished request tells us
    pub fn record_outcome(&self, outcome: &RequestOutcome) {
        let tenant = outcome.tenant.as_str();
        let workload = outcome.workload.as_deref().unwrap_or("default");
        let final_provider = outcome.final_provider().unwrap_or(NO_PROVIDER);

        self.requests_total
            .with_label_values(&[tenant, workload])
            .inc();

        if outcome.success {
            self.requests_success
                .with_label_values(&[tenant, final_provider])
                .inc();
        } else {
            let failure_type = outcome
                .attempts
                .last()
                .and_then(|a| a.failure_type)
                .map(|ft| ft.as_str())
                .unwrap_or("no_viable_provider");
            self.requests_failure
                .with_label_values(&[tenant, final_provider, failure_type])
                .inc();
        }

        let label = if outcome.success { "success" } else { "failure" };
        self.request_duration_seconds
            .with_label_values(&[tenant, label])
            .observe(outcome.total_latency.as_secs_f64());
        self.attempts_per_request
            .observe(outcome.attempts.len() as f64);

        for attempt in &outcome.attempts {
            let label = match attempt.failure_type {
                Some(failure_type) => {
                    self.provider_failures
                        .with_label_values(&[attempt.provider.as_str(), failure_type.as_str()])
                        .inc();
                    "failure"
                }
                None => "success",
            };
            self.attempt_duration_seconds
                .with_label_values(&[attempt.provider.as_str(), label])
                .observe(attempt.latency.as_secs_f64());
        }

        for pair in outcome.attempts.windows(2) {
            if pair[0].provider != pair[1].provider {
                let reason = pair[0].failure_type.map(|ft| ft.as_str()).unwrap_or("unknown");
                self.record_failover(&pair[0].provider, &pair[1].provider, reason);
            }
        }

        if outcome.breaker_engaged {
            self.breaker_engaged.with_label_values(&[tenant]).inc();
        }
    }

    /// Record a provider switch
    pub fn record_failover(&self, from_provider: &str, to_provider: &str, reason: &str) {
        self.failover_triggered
            .with_label_values(&[from_provider, to_provider, reason])
            .inc();
    }

    /// Update circuit breaker state
    pub fn update_circuit_breaker_state(&self, key: &BreakerKey, state: CircuitState) {
        self.circuit_breaker_state
            .with_label_values(&[key.provider.as_str(), key.tenant.as_str()])
            .set(state_value(state));
    }

    /// Record circuit breaker transition
    pub fn record_circuit_breaker_transition(
        &self,
        key: &BreakerKey,
        from: CircuitState,
        to: CircuitState,
    ) {
        self.circuit_breaker_transitions
            .with_label_values(&[
                key.provider.as_str(),
                key.tenant.as_str(),
                from.as_str(),
                to.as_str(),
            ])
            .inc();
        self.update_circuit_breaker_state(key, to);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl OutcomeObserver for Metrics {
    fn on_request_complete(&self, outcome: &RequestOutcome) {
        self.record_outcome(outcome);
    }

    fn on_breaker_transition(&self, key: &BreakerKey, from: CircuitState, to: CircuitState) {
        self.record_circuit_breaker_transition(key, from, to);
    }
}

fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    }
}
