//! Scoring Engine
//!
//! Ranks candidate providers by a weighted sum of five component scores,
//! each in `[0, 1]`:
//!
//! | component   | source                                              |
//! |-------------|-----------------------------------------------------|
//! | performance | rolling success rate / latency from the tracker     |
//! | cost        | estimated request cost against the cost ceiling     |
//! | capability  | workload, language, multimodal and urgency matches  |
//! | health      | provider health snapshot                            |
//! | load        | remaining rate-limit budget                         |
//!
//! Weights come from the routing strategy. The constants are heuristics;
//! the weighting mechanism is what callers rely on.

use crate::context::{RoutingContext, RoutingStrategy, Urgency};
use crate::learning::LearningTracker;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use switchyard_core::normalized::CompletionRequest;
use switchyard_core::provider::{Capability, ProviderKind, ProviderSnapshot};

/// Weight of each component in the total score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub performance: f64,
    pub cost: f64,
    pub capability: f64,
    pub health: f64,
    pub load: f64,
}

impl ScoreWeights {
    pub const fn new(performance: f64, cost: f64, capability: f64, health: f64, load: f64) -> Self {
        Self {
            performance,
            cost,
            capability,
            health,
            load,
        }
    }

    /// Weights for a strategy. `WorkloadOptimized` needs the workload's
    /// cost sensitivity and falls back to balanced weights without one.
    pub fn for_strategy(strategy: RoutingStrategy, cost_sensitivity: Option<f64>) -> Self {
        match strategy {
            RoutingStrategy::PerformanceFirst => Self::new(0.4, 0.1, 0.3, 0.15, 0.05),
            RoutingStrategy::CostFirst => Self::new(0.2, 0.45, 0.2, 0.1, 0.05),
            RoutingStrategy::Balanced => Self::new(0.25, 0.25, 0.25, 0.15, 0.1),
            RoutingStrategy::WorkloadOptimized => match cost_sensitivity {
                Some(sensitivity) => Self::new(0.3, sensitivity * 0.4, 0.35, 0.1, 0.05),
                None => Self::for_strategy(RoutingStrategy::Balanced, None),
            },
            RoutingStrategy::LanguageOptimized => Self::new(0.2, 0.2, 0.4, 0.15, 0.05),
        }
    }
}

/// Routing preferences of one workload (agent) type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    pub preferred_capabilities: Vec<Capability>,
    /// 0.0 = cost irrelevant, 1.0 = very cost sensitive
    pub cost_sensitivity: f64,
    /// Total-score multipliers for specific backend families
    #[serde(default)]
    pub affinity: BTreeMap<ProviderKind, f64>,
}

impl WorkloadProfile {
    fn new(preferred_capabilities: Vec<Capability>, cost_sensitivity: f64) -> Self {
        Self {
            preferred_capabilities,
            cost_sensitivity,
            affinity: BTreeMap::new(),
        }
    }

    fn with_affinity(mut self, kind: ProviderKind, factor: f64) -> Self {
        self.affinity.insert(kind, factor);
        self
    }
}

/// Built-in profiles for the standard workload types
pub fn default_workload_profiles() -> HashMap<String, WorkloadProfile> {
    let zh = || Capability::LanguageOptimized("zh".to_string());
    HashMap::from([
        (
            "compliance".to_string(),
            WorkloadProfile::new(vec![Capability::Reasoning], 0.3)
                .with_affinity(ProviderKind::Anthropic, 1.1),
        ),
        (
            "sentiment".to_string(),
            WorkloadProfile::new(vec![zh()], 0.4).with_affinity(ProviderKind::Gemini, 1.05),
        ),
        (
            "intent".to_string(),
            WorkloadProfile::new(vec![Capability::FastResponse], 0.6)
                .with_affinity(ProviderKind::OpenAI, 1.05),
        ),
        (
            "sales".to_string(),
            WorkloadProfile::new(vec![Capability::Reasoning, zh()], 0.4)
                .with_affinity(ProviderKind::Anthropic, 1.1),
        ),
        (
            "product".to_string(),
            WorkloadProfile::new(vec![Capability::Reasoning], 0.3)
                .with_affinity(ProviderKind::OpenAI, 1.05),
        ),
        (
            "memory".to_string(),
            WorkloadProfile::new(vec![Capability::FastResponse], 0.8),
        ),
        (
            "suggestion".to_string(),
            WorkloadProfile::new(vec![Capability::Reasoning], 0.5),
        ),
    ])
}

/// Component scores of one candidate for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderScore {
    pub provider: String,
    pub total: f64,
    pub performance: f64,
    pub cost: f64,
    pub capability: f64,
    pub health: f64,
    pub load: f64,
    pub strategy: RoutingStrategy,
}

pub struct ScoringEngine {
    profiles: HashMap<String, WorkloadProfile>,
    cost_ceiling: f64,
    default_estimated_tokens: u32,
}

impl ScoringEngine {
    pub fn new(cost_ceiling: f64, default_estimated_tokens: u32) -> Self {
        Self {
            profiles: default_workload_profiles(),
            cost_ceiling,
            default_estimated_tokens,
        }
    }

    /// Replace or add workload profiles
    pub fn with_profiles(mut self, profiles: HashMap<String, WorkloadProfile>) -> Self {
        self.profiles.extend(profiles);
        self
    }

    pub fn profile(&self, workload: &str) -> Option<&WorkloadProfile> {
        self.profiles.get(workload)
    }

    pub fn profiles(&self) -> &HashMap<String, WorkloadProfile> {
        &self.profiles
    }

    /// Score every candidate and sort descending by total.
    ///
    /// The sort is stable, so equal totals keep the candidates' input order.
    pub fn score(
        &self,
        candidates: &[ProviderSnapshot],
        request: &CompletionRequest,
        context: &RoutingContext,
        strategy: RoutingStrategy,
        tracker: &LearningTracker,
    ) -> Vec<ProviderScore> {
        let profile = context.workload.as_deref().and_then(|w| self.profile(w));
        let mut weights = ScoreWeights::for_strategy(strategy, profile.map(|p| p.cost_sensitivity));
        weights.cost *= 2.0 * (1.0 - context.cost_priority);

        let mut scores: Vec<ProviderScore> = candidates
            .iter()
            .map(|candidate| {
                let performance = self.performance_score(candidate, context, tracker);
                let cost = self.cost_score(candidate, request, context);
                let capability = self.capability_score(candidate, context, profile);
                let health = health_score(candidate);
                let load = load_score(candidate);

                let weighted = performance * weights.performance
                    + cost * weights.cost
                    + capability * weights.capability
                    + health * weights.health
                    + load * weights.load;
                let affinity = profile
                    .and_then(|p| p.affinity.get(&candidate.kind))
                    .copied()
                    .unwrap_or(1.0);

                ProviderScore {
                    provider: candidate.id.clone(),
                    total: (weighted * affinity).clamp(0.0, 1.0),
                    performance,
                    cost,
                    capability,
                    health,
                    load,
                    strategy,
                }
            })
            .collect();

        scores.sort_by(|a, b| b.total.total_cmp(&a.total));
        scores
    }

    pub fn performance_score(
        &self,
        candidate: &ProviderSnapshot,
        context: &RoutingContext,
        tracker: &LearningTracker,
    ) -> f64 {
        let base = match tracker.performance(&candidate.id, &context.tenant) {
            Some(stats) => {
                let latency = 1000.0 / (1000.0 + stats.avg_latency_ms.max(0.0));
                0.6 * stats.success_rate + 0.4 * latency
            }
            None => 0.5,
        };
        let preference = context
            .workload
            .as_deref()
            .map(|w| tracker.preference(w, &candidate.id))
            .unwrap_or(1.0);
        (base * preference).clamp(0.0, 1.0)
    }

    pub fn cost_score(
        &self,
        candidate: &ProviderSnapshot,
        request: &CompletionRequest,
        context: &RoutingContext,
    ) -> f64 {
        let caps = &candidate.capabilities;
        let Some(model) = caps.model(&request.model).or_else(|| caps.default_model()) else {
            return 0.5;
        };
        let tokens = context
            .estimated_tokens
            .or(request.max_tokens)
            .unwrap_or(self.default_estimated_tokens);
        let estimated_cost = tokens as f64 / 1000.0 * model.cost_per_1k_tokens;
        (1.0 - estimated_cost / self.cost_ceiling).clamp(0.0, 1.0)
    }

    pub fn capability_score(
        &self,
        candidate: &ProviderSnapshot,
        context: &RoutingContext,
        profile: Option<&WorkloadProfile>,
    ) -> f64 {
        let caps = &candidate.capabilities;
        let mut score = 0.5;

        if let Some(profile) = profile {
            let matches = profile
                .preferred_capabilities
                .iter()
                .filter(|c| caps.has(c))
                .count();
            score += matches as f64 * 0.2;
        }

        if let Some(language) = context.language.as_deref() {
            if caps.is_optimized_for(language) {
                score += 0.3;
            }
            if caps.supports_language(language) {
                score += 0.2;
            }
        }

        if context.multimodal {
            if caps.has(&Capability::Multimodal) {
                score += 0.4;
            } else {
                score -= 0.5;
            }
        }

        if context.urgency == Urgency::High && caps.has(&Capability::FastResponse) {
            score += 0.3;
        }

        score.clamp(0.0, 1.0)
    }
}

/// 0.1 for unhealthy providers, otherwise 1.0 scaled down by error rate,
/// consecutive failures and latency
pub fn health_score(candidate: &ProviderSnapshot) -> f64 {
    let health = &candidate.health;
    if !health.is_healthy {
        return 0.1;
    }

    let mut score = 1.0;
    if health.error_rate > 0.05 {
        score *= 1.0 - health.error_rate.min(0.5);
    }
    if health.consecutive_failures > 0 {
        score *= (1.0 - health.consecutive_failures as f64 * 0.1).max(0.3);
    }
    if health.avg_latency_ms > 3000.0 {
        score *= (3000.0 / health.avg_latency_ms).max(0.5);
    }
    score
}

/// Bucketed remaining rate-limit budget; 1.0 when no limit applies
pub fn load_score(candidate: &ProviderSnapshot) -> f64 {
    let (Some(limit), Some(remaining)) = (candidate.rate_limit_rpm, candidate.health.remaining_quota)
    else {
        return 1.0;
    };
    if limit == 0 {
        return 1.0;
    }

    let ratio = remaining as f64 / limit as f64;
    if ratio > 0.8 {
        1.0
    } else if ratio > 0.5 {
        0.8
    } else if ratio > 0.2 {
        0.6
    } else {
        0.3
    }
}
