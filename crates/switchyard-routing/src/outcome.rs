//! Per-request outcome reporting
//!
//! The router hands every finished request to registered observers; metrics
//! and audit sinks live outside this crate.

use crate::circuit_breaker::{BreakerKey, CircuitState};
use crate::failure::{FailoverAction, FailureType};
use serde::Serialize;
use std::time::Duration;
use switchyard_core::TenantId;

/// One provider call made for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptOutcome {
    pub provider: String,
    /// Cumulative attempt number (1-based)
    pub attempt: u32,
    pub latency: Duration,
    /// `None` for the successful attempt
    pub failure_type: Option<FailureType>,
    /// What the router did after this attempt failed
    pub action: Option<FailoverAction>,
}

/// Summary of one routed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub request_id: String,
    pub tenant: TenantId,
    pub workload: Option<String>,
    pub attempts: Vec<AttemptOutcome>,
    pub total_latency: Duration,
    /// Whether a breaker opened during the request or rejected a candidate
    pub breaker_engaged: bool,
    pub success: bool,
}

impl RequestOutcome {
    /// Providers tried, in order, without consecutive duplicates
    pub fn providers_tried(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = Vec::new();
        for attempt in &self.attempts {
            if providers.last() != Some(&attempt.provider.as_str()) {
                providers.push(&attempt.provider);
            }
        }
        providers
    }

    pub fn final_provider(&self) -> Option<&str> {
        self.attempts.last().map(|a| a.provider.as_str())
    }

    /// Number of times the request moved to another provider
    pub fn failovers(&self) -> usize {
        self.providers_tried().len().saturating_sub(1)
    }
}

/// Sink for request outcomes and breaker transitions
pub trait OutcomeObserver: Send + Sync {
    fn on_request_complete(&self, outcome: &RequestOutcome);

    fn on_breaker_transition(&self, _key: &BreakerKey, _from: CircuitState, _to: CircuitState) {}
}
