//! Failover policy configuration

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::context::RoutingStrategy;
use crate::failure::FailureType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Retry/switch policy for one failure type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Minimum wait before the next attempt after this failure
    #[serde(with = "serde_secs", default)]
    pub retry_delay: Duration,
    /// Attempts allowed on the same provider before switching
    pub max_retries: u32,
    /// Cumulative attempts after which the request gives up
    pub switch_threshold: u32,
}

impl FailurePolicy {
    pub const fn new(retry_delay_secs: u64, max_retries: u32, switch_threshold: u32) -> Self {
        Self {
            retry_delay: Duration::from_secs(retry_delay_secs),
            max_retries,
            switch_threshold,
        }
    }
}

/// Static failover policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Total attempts per request across all providers
    pub max_retry_attempts: u32,
    /// Ordered backoff table; the last entry is reused past its end
    #[serde(with = "serde_secs::vec")]
    pub retry_delays: Vec<Duration>,
    /// Ceiling applied to table delays
    #[serde(with = "serde_secs")]
    pub max_retry_delay: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub failure_patterns: BTreeMap<FailureType, FailurePolicy>,
    /// Policy for failure types missing from `failure_patterns`
    pub fallback_policy: FailurePolicy,
    pub enable_context_preservation: bool,
    /// Deadline for a single provider call
    #[serde(with = "serde_secs")]
    pub attempt_timeout: Duration,
    pub max_failure_history: usize,
    /// Outcomes kept per (provider, tenant) for performance scoring
    pub performance_window: usize,
    pub max_routing_history: usize,
    /// Inactivity after which a stored conversation expires
    #[serde(with = "serde_secs")]
    pub context_max_age: Duration,
    /// Estimated request cost (USD) that scores zero on cost
    pub cost_ceiling: f64,
    /// Token estimate when the request carries no `max_tokens`
    pub default_estimated_tokens: u32,
    pub default_strategy: RoutingStrategy,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            max_retry_delay: Duration::from_secs(60),
            circuit_breaker: CircuitBreakerConfig::default(),
            failure_patterns: default_failure_patterns(),
            fallback_policy: FailurePolicy::new(0, 0, 1),
            enable_context_preservation: true,
            attempt_timeout: Duration::from_secs(30),
            max_failure_history: 10_000,
            performance_window: 100,
            max_routing_history: 10_000,
            context_max_age: Duration::from_secs(3600),
            cost_ceiling: 0.1,
            default_estimated_tokens: 1000,
            default_strategy: RoutingStrategy::Balanced,
        }
    }
}

fn default_failure_patterns() -> BTreeMap<FailureType, FailurePolicy> {
    BTreeMap::from([
        (FailureType::RateLimit, FailurePolicy::new(60, 2, 2)),
        (FailureType::Timeout, FailurePolicy::new(5, 2, 3)),
        (FailureType::Authentication, FailurePolicy::new(0, 0, 1)),
        (FailureType::ModelNotFound, FailurePolicy::new(0, 0, 1)),
        (FailureType::ApiError, FailurePolicy::new(2, 3, 2)),
        (FailureType::NetworkError, FailurePolicy::new(1, 2, 3)),
    ])
}

impl FailoverConfig {
    /// Policy for a failure type, falling back to `fallback_policy`
    pub fn policy_for(&self, failure_type: FailureType) -> FailurePolicy {
        self.failure_patterns
            .get(&failure_type)
            .copied()
            .unwrap_or(self.fallback_policy)
    }

    /// Table delay before attempt `n + 1`, capped at `max_retry_delay`
    pub fn table_delay(&self, n: usize) -> Duration {
        let delay = match self.retry_delays.get(n) {
            Some(delay) => *delay,
            None => self.retry_delays.last().copied().unwrap_or_default(),
        };
        delay.min(self.max_retry_delay)
    }

    /// Validate configuration values
    ///
    /// Returns an error if the configuration is invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be greater than 0".to_string());
        }
        if self.retry_delays.is_empty() {
            return Err("retry_delays must not be empty".to_string());
        }
        if self.retry_delays.windows(2).any(|w| w[1] < w[0]) {
            return Err("retry_delays must be non-decreasing".to_string());
        }
        if self.attempt_timeout.is_zero() {
            return Err("attempt_timeout must be greater than 0".to_string());
        }
        if self.max_failure_history == 0 {
            return Err("max_failure_history must be greater than 0".to_string());
        }
        if self.performance_window == 0 {
            return Err("performance_window must be greater than 0".to_string());
        }
        if self.max_routing_history == 0 {
            return Err("max_routing_history must be greater than 0".to_string());
        }
        if self.cost_ceiling.is_nan() || self.cost_ceiling <= 0.0 {
            return Err("cost_ceiling must be greater than 0".to_string());
        }
        self.circuit_breaker.validate()
    }
}

/// Durations as (fractional) seconds
pub(crate) mod serde_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub mod vec {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(
            values: &[Duration],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&value.as_secs_f64())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Duration>, D::Error> {
            Vec::<f64>::deserialize(deserializer)?
                .into_iter()
                .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}
