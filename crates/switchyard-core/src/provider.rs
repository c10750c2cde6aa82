//! Provider trait definitions
//!
//! A provider is one backend (OpenAI, Anthropic, ...) the router can send a
//! completion to. The routing engine only depends on the trait here and the
//! read-only [`ProviderSnapshot`] built from it; wire formats, token counting
//! and pricing live behind implementations.

use crate::{
    error::ProviderError,
    normalized::{CompletionRequest, CompletionResponse},
    tenant::TenantId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, unique within a registry
    fn id(&self) -> &str;

    /// Execute a non-streaming completion
    async fn execute(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Capability tags, models and languages
    fn capabilities(&self) -> ProviderCapabilities;

    /// Live health view
    fn health(&self) -> HealthSnapshot {
        HealthSnapshot::default()
    }

    /// Static configuration: kind, priority, limits and request dialect
    fn profile(&self) -> ProviderProfile;
}

/// Backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Gemini,
    DeepSeek,
    Other,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tag advertised by a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextGeneration,
    Reasoning,
    CodeGeneration,
    Multimodal,
    FastResponse,
    CostEffective,
    /// Tuned for a specific content language (ISO 639-1 code)
    LanguageOptimized(String),
}

/// A model offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Price in USD per 1000 tokens
    pub cost_per_1k_tokens: f64,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, cost_per_1k_tokens: f64) -> Self {
        Self {
            name: name.into(),
            cost_per_1k_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub tags: BTreeSet<Capability>,
    /// Models in preference order; the first is the provider's default
    pub models: Vec<ModelInfo>,
    /// Supported content languages (ISO 639-1 codes)
    pub languages: Vec<String>,
}

impl ProviderCapabilities {
    pub fn has(&self, capability: &Capability) -> bool {
        self.tags.contains(capability)
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    pub fn is_optimized_for(&self, language: &str) -> bool {
        self.tags.iter().any(|tag| {
            matches!(tag, Capability::LanguageOptimized(l) if l.eq_ignore_ascii_case(language))
        })
    }

    pub fn model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn default_model(&self) -> Option<&ModelInfo> {
        self.models.first()
    }
}

/// Point-in-time health of a provider as reported by its implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    /// Recent error rate (0.0 to 1.0)
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    /// Remaining requests in the current rate-limit window, if known
    pub remaining_quota: Option<u32>,
    pub consecutive_failures: u32,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            is_healthy: true,
            error_rate: 0.0,
            avg_latency_ms: 0.0,
            remaining_quota: None,
            consecutive_failures: 0,
        }
    }
}

/// What a provider accepts in a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    pub supports_system_role: bool,
    pub supports_tool_role: bool,
    /// Parameter names the backend rejects
    #[serde(default)]
    pub unsupported_parameters: BTreeSet<String>,
    /// Upper bound accepted for `top_p`
    #[serde(default)]
    pub max_top_p: Option<f64>,
}

impl Dialect {
    /// Known constraints of a backend family
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Anthropic => Self {
                supports_system_role: true,
                supports_tool_role: false,
                unsupported_parameters: BTreeSet::new(),
                max_top_p: Some(0.99),
            },
            ProviderKind::Gemini => Self {
                supports_system_role: false,
                supports_tool_role: false,
                unsupported_parameters: ["frequency_penalty", "presence_penalty"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                max_top_p: None,
            },
            ProviderKind::OpenAI | ProviderKind::DeepSeek | ProviderKind::Other => Self::default(),
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            supports_system_role: true,
            supports_tool_role: true,
            unsupported_parameters: BTreeSet::new(),
            max_top_p: None,
        }
    }
}

/// Static provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    /// Registry ordering, lower first
    pub priority: u32,
    /// Requests-per-minute limit, if the backend enforces one
    pub rate_limit_rpm: Option<u32>,
    pub dialect: Dialect,
}

impl ProviderProfile {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            priority: 1,
            rate_limit_rpm: Some(1000),
            dialect: Dialect::for_kind(kind),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate_limit(mut self, rpm: Option<u32>) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }
}

/// Read-only view of a provider taken at routing time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSnapshot {
    pub id: String,
    pub kind: ProviderKind,
    pub priority: u32,
    pub rate_limit_rpm: Option<u32>,
    pub capabilities: ProviderCapabilities,
    pub health: HealthSnapshot,
    pub dialect: Dialect,
}

impl ProviderSnapshot {
    pub fn capture(provider: &dyn Provider) -> Self {
        let profile = provider.profile();
        Self {
            id: provider.id().to_string(),
            kind: profile.kind,
            priority: profile.priority,
            rate_limit_rpm: profile.rate_limit_rpm,
            capabilities: provider.capabilities(),
            health: provider.health(),
            dialect: profile.dialect,
        }
    }
}

/// Source of providers for a tenant
pub trait ProviderRegistry: Send + Sync {
    /// Providers eligible for the tenant, sorted by static priority
    fn available_providers(&self, tenant: &TenantId) -> Vec<Arc<dyn Provider>>;

    /// Look up a provider by ID
    fn get(&self, id: &str) -> Option<Arc<dyn Provider>>;
}

/// In-memory registry with a fixed provider set shared by all tenants
pub struct StaticRegistry {
    providers: Vec<Arc<dyn Provider>>,
    include_unhealthy: bool,
}

impl StaticRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut providers = providers;
        // Stable: equal priorities keep registration order
        providers.sort_by_key(|p| p.profile().priority);
        Self {
            providers,
            include_unhealthy: false,
        }
    }

    /// Also list providers whose health snapshot reports them unhealthy
    pub fn include_unhealthy(mut self, include: bool) -> Self {
        self.include_unhealthy = include;
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderRegistry for StaticRegistry {
    fn available_providers(&self, _tenant: &TenantId) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| self.include_unhealthy || p.health().is_healthy)
            .cloned()
            .collect()
    }

    fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }
}
