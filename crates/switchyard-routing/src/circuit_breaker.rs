//! Circuit Breaker Manager
//!
//! Keeps one breaker per (provider, tenant) key so that a failing provider
//! for one tenant never gates another tenant's traffic.
//!
//! State transitions:
//! - Closed → Open: when the failure count reaches the threshold
//! - Open → HalfOpen: lazily, on the first `is_open` check after the open
//!   duration has elapsed
//! - HalfOpen → Closed: after `success_threshold` consecutive successes
//! - HalfOpen → Open: on any failure during testing
//!
//! A success while Closed decrements the failure count by one instead of
//! resetting it, so isolated failures fade out while bursts accumulate.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::TenantId;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests rejected before dispatch
    Open,
    /// Testing recovery - requests pass, outcomes decide the next state
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure count at which the circuit opens
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays open before a trial request is allowed
    #[serde(with = "crate::config::serde_secs")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_duration: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("circuit_breaker.failure_threshold must be greater than 0".to_string());
        }
        if self.success_threshold == 0 {
            return Err("circuit_breaker.success_threshold must be greater than 0".to_string());
        }
        if self.open_duration.is_zero() {
            return Err("circuit_breaker.open_duration must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Breaker identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakerKey {
    pub provider: String,
    pub tenant: TenantId,
}

impl BreakerKey {
    pub fn new(provider: impl Into<String>, tenant: &TenantId) -> Self {
        Self {
            provider: provider.into(),
            tenant: tenant.clone(),
        }
    }
}

impl fmt::Display for BreakerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.tenant)
    }
}

/// Mutable state of one breaker.
///
/// `is_open` implies `next_attempt_time.is_some()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub half_open: bool,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub next_attempt_time: Option<Instant>,
    pub half_open_success_count: u32,
}

impl CircuitBreakerState {
    pub fn state(&self) -> CircuitState {
        if self.is_open {
            CircuitState::Open
        } else if self.half_open {
            CircuitState::HalfOpen
        } else {
            CircuitState::Closed
        }
    }
}

/// Serializable view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStats {
    pub provider: String,
    pub tenant: TenantId,
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_success_count: u32,
    /// Seconds until an open breaker admits a trial request
    pub retry_in_secs: Option<f64>,
    pub last_failure_secs_ago: Option<f64>,
}

/// Callback invoked on every state change
pub type TransitionHook = Arc<dyn Fn(&BreakerKey, CircuitState, CircuitState) + Send + Sync>;

/// Per-(provider, tenant) circuit breakers
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    /// Uses DashMap so unrelated keys never contend
    breakers: DashMap<BreakerKey, CircuitBreakerState>,
    hook: Option<TransitionHook>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            hook: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Register a callback for state transitions
    pub fn with_transition_hook(mut self, hook: TransitionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether dispatch to `key` must be rejected.
    ///
    /// An open breaker whose open duration has elapsed moves to half-open
    /// here and admits the request.
    pub fn is_open(&self, key: &BreakerKey) -> bool {
        let transitioned = {
            let Some(mut entry) = self.breakers.get_mut(key) else {
                return false;
            };
            if !entry.is_open {
                return false;
            }
            match entry.next_attempt_time {
                Some(next) if Instant::now() >= next => {
                    entry.is_open = false;
                    entry.half_open = true;
                    entry.half_open_success_count = 0;
                    entry.next_attempt_time = None;
                    true
                }
                _ => return true,
            }
        };

        if transitioned {
            tracing::info!(breaker = %key, "Circuit breaker half-open (testing recovery)");
            self.notify(key, CircuitState::Open, CircuitState::HalfOpen);
        }
        false
    }

    /// Current state without triggering the lazy half-open transition
    pub fn state(&self, key: &BreakerKey) -> CircuitState {
        self.breakers
            .get(key)
            .map(|entry| entry.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Copy of the raw state for a key
    pub fn get(&self, key: &BreakerKey) -> Option<CircuitBreakerState> {
        self.breakers.get(key).map(|entry| entry.clone())
    }

    /// Record a failed call. Returns true if this failure opened the breaker.
    pub fn record_failure(&self, key: &BreakerKey) -> bool {
        let now = Instant::now();
        let (from, opened, failure_count) = {
            let mut entry = self.breakers.entry(key.clone()).or_default();
            let from = entry.state();

            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.last_failure_time = Some(now);
            entry.half_open_success_count = 0;

            let should_open = from != CircuitState::Open
                && (from == CircuitState::HalfOpen
                    || entry.failure_count >= self.config.failure_threshold);
            if should_open {
                entry.is_open = true;
                entry.half_open = false;
                entry.next_attempt_time = Some(now + self.config.open_duration);
            }
            (from, should_open, entry.failure_count)
        };

        if opened {
            tracing::warn!(
                breaker = %key,
                failure_count,
                open_for_secs = self.config.open_duration.as_secs_f64(),
                "Circuit breaker opened"
            );
            self.notify(key, from, CircuitState::Open);
        } else {
            tracing::debug!(breaker = %key, failure_count, "Recorded provider failure");
        }
        opened
    }

    /// Record a successful call
    pub fn record_success(&self, key: &BreakerKey) {
        let closed = {
            let Some(mut entry) = self.breakers.get_mut(key) else {
                return;
            };
            match entry.state() {
                CircuitState::HalfOpen => {
                    entry.half_open_success_count += 1;
                    if entry.half_open_success_count >= self.config.success_threshold {
                        entry.half_open = false;
                        entry.failure_count = 0;
                        entry.half_open_success_count = 0;
                        true
                    } else {
                        false
                    }
                }
                CircuitState::Closed => {
                    entry.failure_count = entry.failure_count.saturating_sub(1);
                    false
                }
                // A call admitted before the breaker opened
                CircuitState::Open => false,
            }
        };

        if closed {
            tracing::info!(breaker = %key, "Circuit breaker closed (recovered)");
            self.notify(key, CircuitState::HalfOpen, CircuitState::Closed);
        }
    }

    /// Remove a breaker, returning it to a fresh closed state
    pub fn reset(&self, key: &BreakerKey) -> bool {
        let removed = self.breakers.remove(key);
        if let Some((_, state)) = &removed {
            tracing::info!(breaker = %key, "Circuit breaker reset");
            if state.state() != CircuitState::Closed {
                self.notify(key, state.state(), CircuitState::Closed);
            }
        }
        removed.is_some()
    }

    /// Snapshot of every tracked breaker, ordered by key
    pub fn stats(&self) -> Vec<BreakerStats> {
        let now = Instant::now();
        let mut stats: Vec<BreakerStats> = self
            .breakers
            .iter()
            .map(|entry| {
                let (key, state) = entry.pair();
                BreakerStats {
                    provider: key.provider.clone(),
                    tenant: key.tenant.clone(),
                    state: state.state(),
                    failure_count: state.failure_count,
                    half_open_success_count: state.half_open_success_count,
                    retry_in_secs: state
                        .next_attempt_time
                        .filter(|_| state.is_open)
                        .map(|next| next.saturating_duration_since(now).as_secs_f64()),
                    last_failure_secs_ago: state
                        .last_failure_time
                        .map(|t| now.saturating_duration_since(t).as_secs_f64()),
                }
            })
            .collect();
        stats.sort_by(|a, b| (&a.provider, &a.tenant).cmp(&(&b.provider, &b.tenant)));
        stats
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn notify(&self, key: &BreakerKey, from: CircuitState, to: CircuitState) {
        if let Some(hook) = &self.hook {
            hook(key, from, to);
        }
    }
}
