//! Per-request routing context and routing strategies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use switchyard_core::TenantId;

/// How quickly the caller needs an answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// Named weighting policy used when scoring providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    PerformanceFirst,
    CostFirst,
    #[default]
    Balanced,
    WorkloadOptimized,
    LanguageOptimized,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerformanceFirst => "performance-first",
            Self::CostFirst => "cost-first",
            Self::Balanced => "balanced",
            Self::WorkloadOptimized => "workload-optimized",
            Self::LanguageOptimized => "language-optimized",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = switchyard_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "performance-first" => Ok(Self::PerformanceFirst),
            "cost-first" => Ok(Self::CostFirst),
            "balanced" => Ok(Self::Balanced),
            "workload-optimized" => Ok(Self::WorkloadOptimized),
            "language-optimized" => Ok(Self::LanguageOptimized),
            other => Err(switchyard_core::Error::Config(format!(
                "Unknown routing strategy '{}'",
                other
            ))),
        }
    }
}

/// Immutable metadata describing one logical request.
///
/// Built once with the `with_*` builders. Each failover iteration produces a
/// new value through [`RoutingContext::advance`] rather than mutating the
/// original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Workload (agent) type, e.g. "compliance" or "sales"
    pub workload: Option<String>,
    pub tenant: TenantId,
    pub conversation_id: Option<String>,
    /// Detected content language (ISO 639-1)
    pub language: Option<String>,
    pub multimodal: bool,
    pub urgency: Urgency,
    /// 0.0 = cheapest possible, 1.0 = ignore cost
    pub cost_priority: f64,
    /// Minimum total score a provider needs to be preferred
    pub quality_threshold: f64,
    /// Strategy override; the router default applies when unset
    pub strategy: Option<RoutingStrategy>,
    /// Token estimate used by cost scoring
    pub estimated_tokens: Option<u32>,
    pub previous_provider: Option<String>,
    pub retry_count: u32,
}

impl RoutingContext {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            workload: None,
            tenant,
            conversation_id: None,
            language: None,
            multimodal: false,
            urgency: Urgency::Medium,
            cost_priority: 0.5,
            quality_threshold: 0.8,
            strategy: None,
            estimated_tokens: None,
            previous_provider: None,
            retry_count: 0,
        }
    }

    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into().to_lowercase());
        self
    }

    pub fn with_multimodal(mut self, multimodal: bool) -> Self {
        self.multimodal = multimodal;
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Clamped to `[0, 1]`
    pub fn with_cost_priority(mut self, cost_priority: f64) -> Self {
        self.cost_priority = cost_priority.clamp(0.0, 1.0);
        self
    }

    /// Clamped to `[0, 1]`
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    /// Context for the next failover iteration after `failed_provider`
    pub fn advance(&self, failed_provider: &str) -> Self {
        Self {
            previous_provider: Some(failed_provider.to_string()),
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    pub fn is_retry(&self) -> bool {
        self.retry_count > 0
    }
}
