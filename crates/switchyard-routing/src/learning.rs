//! Learning / Stats Tracker
//!
//! Records call outcomes and routing decisions, and feeds the scoring engine
//! with rolling per-(provider, tenant) performance data and per-workload
//! provider preferences.

use crate::context::RoutingStrategy;
use crate::scoring::ProviderScore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use switchyard_core::TenantId;

const PREFERENCE_MIN: f64 = 0.5;
const PREFERENCE_MAX: f64 = 1.5;
const PREFERENCE_REWARD: f64 = 1.01;
const PREFERENCE_PENALTY: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
struct Sample {
    success: bool,
    latency: Duration,
}

/// Rolling performance of one provider for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub samples: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

/// One routing decision
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecisionRecord {
    pub request_id: String,
    pub tenant: TenantId,
    pub workload: Option<String>,
    pub strategy: RoutingStrategy,
    pub selected: String,
    pub scores: Vec<ProviderScore>,
    pub routing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over the routing decision log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingStats {
    pub total_decisions: usize,
    pub provider_usage: BTreeMap<String, usize>,
    pub workload_usage: BTreeMap<String, usize>,
    pub avg_routing_time_ms: f64,
}

pub struct LearningTracker {
    window: usize,
    max_decisions: usize,
    performance: DashMap<(String, TenantId), VecDeque<Sample>>,
    /// (workload, provider) → multiplier in [0.5, 1.5]
    preferences: DashMap<(String, String), f64>,
    decisions: Mutex<VecDeque<RoutingDecisionRecord>>,
}

impl LearningTracker {
    pub fn new(window: usize, max_decisions: usize) -> Self {
        Self {
            window: window.max(1),
            max_decisions: max_decisions.max(1),
            performance: DashMap::new(),
            preferences: DashMap::new(),
            decisions: Mutex::new(VecDeque::new()),
        }
    }

    /// Record the outcome of one provider call
    pub fn record_outcome(
        &self,
        provider: &str,
        tenant: &TenantId,
        workload: Option<&str>,
        success: bool,
        latency: Duration,
    ) {
        {
            let mut samples = self
                .performance
                .entry((provider.to_string(), tenant.clone()))
                .or_default();
            if samples.len() == self.window {
                samples.pop_front();
            }
            samples.push_back(Sample { success, latency });
        }

        if let Some(workload) = workload {
            let mut factor = self
                .preferences
                .entry((workload.to_string(), provider.to_string()))
                .or_insert(1.0);
            let adjusted = if success {
                *factor * PREFERENCE_REWARD
            } else {
                *factor * PREFERENCE_PENALTY
            };
            *factor = adjusted.clamp(PREFERENCE_MIN, PREFERENCE_MAX);
        }

        tracing::debug!(
            provider,
            tenant = %tenant,
            success,
            latency_ms = latency.as_millis() as u64,
            "Recorded provider outcome"
        );
    }

    /// Rolling stats, or `None` before the first recorded outcome
    pub fn performance(&self, provider: &str, tenant: &TenantId) -> Option<PerformanceStats> {
        let samples = self
            .performance
            .get(&(provider.to_string(), tenant.clone()))?;
        if samples.is_empty() {
            return None;
        }
        let count = samples.len();
        let successes = samples.iter().filter(|s| s.success).count();
        let total_ms: f64 = samples
            .iter()
            .map(|s| s.latency.as_secs_f64() * 1000.0)
            .sum();
        Some(PerformanceStats {
            samples: count,
            success_rate: successes as f64 / count as f64,
            avg_latency_ms: total_ms / count as f64,
        })
    }

    /// Learned preference multiplier, 1.0 when nothing has been learned
    pub fn preference(&self, workload: &str, provider: &str) -> f64 {
        self.preferences
            .get(&(workload.to_string(), provider.to_string()))
            .map(|f| *f)
            .unwrap_or(1.0)
    }

    pub fn record_decision(&self, record: RoutingDecisionRecord) {
        let mut decisions = self
            .decisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if decisions.len() == self.max_decisions {
            decisions.pop_front();
        }
        decisions.push_back(record);
    }

    /// Up to `limit` most recent decisions, newest last
    pub fn recent_decisions(&self, limit: usize) -> Vec<RoutingDecisionRecord> {
        let decisions = self
            .decisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = decisions.len().saturating_sub(limit);
        decisions.iter().skip(skip).cloned().collect()
    }

    pub fn routing_stats(&self) -> RoutingStats {
        let decisions = self
            .decisions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if decisions.is_empty() {
            return RoutingStats::default();
        }

        let mut stats = RoutingStats {
            total_decisions: decisions.len(),
            ..RoutingStats::default()
        };
        let mut total_ms = 0.0;
        for decision in decisions.iter() {
            *stats
                .provider_usage
                .entry(decision.selected.clone())
                .or_default() += 1;
            if let Some(workload) = &decision.workload {
                *stats.workload_usage.entry(workload.clone()).or_default() += 1;
            }
            total_ms += decision.routing_time_ms;
        }
        stats.avg_routing_time_ms = total_ms / decisions.len() as f64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> LearningTracker {
        LearningTracker::new(4, 3)
    }

    fn decision(selected: &str, workload: Option<&str>, ms: f64) -> RoutingDecisionRecord {
        RoutingDecisionRecord {
            request_id: "r".to_string(),
            tenant: TenantId::default(),
            workload: workload.map(String::from),
            strategy: RoutingStrategy::Balanced,
            selected: selected.to_string(),
            scores: vec![],
            routing_time_ms: ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_no_history() {
        let t = tracker();
        assert!(t.performance("a", &TenantId::default()).is_none());
        assert_eq!(t.preference("sales", "a"), 1.0);
    }

    #[test]
    fn test_performance_window() {
        let t = tracker();
        let tenant = TenantId::default();
        t.record_outcome("a", &tenant, None, false, Duration::from_millis(1000));
        for _ in 0..4 {
            t.record_outcome("a", &tenant, None, true, Duration::from_millis(200));
        }

        // The failure fell out of the 4-sample window
        let stats = t.performance("a", &tenant).unwrap();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.success_rate, 1.0);
        assert!((stats.avg_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_performance_is_per_tenant() {
        let t = tracker();
        let acme = TenantId::new("acme").unwrap();
        t.record_outcome("a", &acme, None, false, Duration::from_millis(10));
        assert!(t.performance("a", &TenantId::default()).is_none());
        assert_eq!(t.performance("a", &acme).unwrap().success_rate, 0.0);
    }

    #[test]
    fn test_preference_bounds() {
        let t = tracker();
        let tenant = TenantId::default();
        for _ in 0..100 {
            t.record_outcome("a", &tenant, Some("sales"), true, Duration::ZERO);
            t.record_outcome("b", &tenant, Some("sales"), false, Duration::ZERO);
        }
        assert_eq!(t.preference("sales", "a"), PREFERENCE_MAX);
        assert_eq!(t.preference("sales", "b"), PREFERENCE_MIN);
        assert_eq!(t.preference("memory", "a"), 1.0);
    }

    #[test]
    fn test_preference_nudges() {
        let t = tracker();
        let tenant = TenantId::default();
        t.record_outcome("a", &tenant, Some("intent"), true, Duration::ZERO);
        assert!((t.preference("intent", "a") - 1.01).abs() < 1e-12);
        t.record_outcome("a", &tenant, Some("intent"), false, Duration::ZERO);
        assert!((t.preference("intent", "a") - 1.01 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_routing_stats_bounded_log() {
        let t = tracker();
        t.record_decision(decision("a", Some("sales"), 1.0));
        t.record_decision(decision("a", Some("sales"), 2.0));
        t.record_decision(decision("b", None, 3.0));
        t.record_decision(decision("b", Some("memory"), 6.0));

        let stats = t.routing_stats();
        assert_eq!(stats.total_decisions, 3);
        assert_eq!(stats.provider_usage["a"], 1);
        assert_eq!(stats.provider_usage["b"], 2);
        assert_eq!(stats.workload_usage["sales"], 1);
        assert!((stats.avg_routing_time_ms - 11.0 / 3.0).abs() < 1e-9);

        let recent = t.recent_decisions(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].routing_time_ms, 6.0);
    }
}
