//! Rule/Filter Engine
//!
//! Narrows the candidate list before scoring:
//! - Drops the previously failed provider on a failover retry
//! - Applies routing rules (highest priority first, first match wins)
//! - Without a matching rule, prefers providers with the workload's
//!   preferred capabilities, or those optimized for the content language
//!
//! An empty preferred subset never empties the result: the engine falls back
//! to the post-exclusion list, or to the full list if exclusion removed
//! everything.

use crate::context::{RoutingContext, Urgency};
use crate::scoring::WorkloadProfile;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use switchyard_core::provider::ProviderSnapshot;

/// A routing rule that matches requests and names preferred providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Priority of this rule (higher = evaluated first)
    #[serde(default)]
    pub priority: i32,
    /// Optional name for the rule (for debugging/logging)
    #[serde(default)]
    pub name: Option<String>,
    pub matcher: RuleMatcher,
    /// Preferred provider ids
    pub providers: Vec<String>,
}

impl RoutingRule {
    pub fn new(matcher: RuleMatcher, providers: Vec<String>) -> Self {
        Self {
            priority: 0,
            name: None,
            matcher,
            providers,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check that the rule names providers and its pattern compiles
    pub fn validate(&self) -> Result<(), String> {
        if self.providers.is_empty() {
            return Err(format!("rule '{}' names no providers", self.display_name()));
        }
        if let RuleMatcher::WorkloadPattern { pattern, .. } = &self.matcher
            && let Err(e) = Regex::new(pattern)
        {
            return Err(format!(
                "rule '{}' has an invalid workload pattern: {}",
                self.display_name(),
                e
            ));
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("rule_priority_{}", self.priority))
    }
}

/// Matcher for routing rules
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleMatcher {
    /// Match the workload type against a regex
    #[serde(rename = "workload")]
    WorkloadPattern {
        pattern: String,
        /// Compiled regex (lazily initialized, not serialized)
        #[serde(skip)]
        compiled: OnceCell<Option<Regex>>,
    },
    /// Match the content language (case-insensitive)
    #[serde(rename = "language")]
    Language { language: String },
    /// Match requests carrying multimodal content
    #[serde(rename = "multimodal")]
    Multimodal,
    /// Match a given urgency level
    #[serde(rename = "urgency")]
    Urgency { urgency: Urgency },
    /// Always matches (catch-all/default rule)
    #[serde(rename = "always")]
    Always,
}

// OnceCell<Regex> is recompiled lazily in the clone
impl Clone for RuleMatcher {
    fn clone(&self) -> Self {
        match self {
            RuleMatcher::WorkloadPattern { pattern, .. } => RuleMatcher::WorkloadPattern {
                pattern: pattern.clone(),
                compiled: OnceCell::new(),
            },
            RuleMatcher::Language { language } => RuleMatcher::Language {
                language: language.clone(),
            },
            RuleMatcher::Multimodal => RuleMatcher::Multimodal,
            RuleMatcher::Urgency { urgency } => RuleMatcher::Urgency { urgency: *urgency },
            RuleMatcher::Always => RuleMatcher::Always,
        }
    }
}

impl RuleMatcher {
    pub fn workload_pattern(pattern: impl Into<String>) -> Self {
        RuleMatcher::WorkloadPattern {
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn language(language: impl Into<String>) -> Self {
        RuleMatcher::Language {
            language: language.into(),
        }
    }

    fn matches(&self, context: &RoutingContext) -> bool {
        match self {
            RuleMatcher::WorkloadPattern { pattern, compiled } => {
                let regex = compiled.get_or_init(|| match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::warn!(
                            "Invalid regex pattern '{}' in routing rule: {}",
                            pattern,
                            e
                        );
                        None
                    }
                });
                match (regex, context.workload.as_deref()) {
                    (Some(regex), Some(workload)) => regex.is_match(workload),
                    _ => false,
                }
            }
            RuleMatcher::Language { language } => context
                .language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(language)),
            RuleMatcher::Multimodal => context.multimodal,
            RuleMatcher::Urgency { urgency } => context.urgency == *urgency,
            RuleMatcher::Always => true,
        }
    }
}

/// Priority-ordered rule set plus the pre-scoring filter
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    /// Sorted by priority, highest first
    rules: Vec<RoutingRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut rules: Vec<RoutingRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// First rule matching the context
    pub fn find_rule(&self, context: &RoutingContext) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(context))
    }

    /// Filter `candidates` for the context. Pure and deterministic.
    pub fn filter(
        &self,
        candidates: &[ProviderSnapshot],
        context: &RoutingContext,
        profile: Option<&WorkloadProfile>,
    ) -> Vec<ProviderSnapshot> {
        let excluded: Vec<&ProviderSnapshot> = match context.previous_provider.as_deref() {
            Some(previous) if context.is_retry() => {
                candidates.iter().filter(|c| c.id != previous).collect()
            }
            _ => candidates.iter().collect(),
        };

        let preferred: Vec<&ProviderSnapshot> = if let Some(rule) = self.find_rule(context) {
            tracing::debug!(
                rule = %rule.display_name(),
                providers = ?rule.providers,
                "Matched routing rule"
            );
            excluded
                .iter()
                .copied()
                .filter(|c| rule.providers.iter().any(|p| p == &c.id))
                .collect()
        } else if let Some(profile) = profile {
            excluded
                .iter()
                .copied()
                .filter(|c| {
                    profile
                        .preferred_capabilities
                        .iter()
                        .any(|cap| c.capabilities.has(cap))
                })
                .collect()
        } else if let Some(language) = context.language.as_deref() {
            excluded
                .iter()
                .copied()
                .filter(|c| c.capabilities.is_optimized_for(language))
                .collect()
        } else {
            excluded.clone()
        };

        let chosen = if !preferred.is_empty() {
            preferred
        } else if !excluded.is_empty() {
            tracing::debug!("No preferred providers available, using unfiltered candidates");
            excluded
        } else {
            candidates.iter().collect()
        };
        chosen.into_iter().cloned().collect()
    }
}
