//! Top-level configuration document

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{Error, ProviderRegistry, Result};
use switchyard_observability::{LogFormat, LoggingConfig};
use switchyard_routing::{
    FailoverConfig, FailoverRouter, FailoverRouterBuilder, RoutingRule, RoutingStrategy,
    WorkloadProfile,
};
use tracing::warn;

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` is TOML, anything else is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub failover: FailoverConfig,

    #[serde(default)]
    pub routing: RoutingSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingSection {
    /// Overrides `failover.default_strategy` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RoutingStrategy>,

    #[serde(default)]
    pub rules: Vec<RoutingRule>,

    /// Added to (and overriding) the built-in workload profiles
    #[serde(default)]
    pub workload_profiles: HashMap<String, WorkloadProfile>,
}

impl SwitchyardConfig {
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(contents)
                .map_err(|e| Error::Config(format!("Invalid TOML: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("Invalid YAML: {}", e))),
        }
    }

    pub fn to_text(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("TOML serialization error: {}", e))),
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| Error::Config(format!("YAML serialization error: {}", e))),
        }
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        // Logging settings
        if let Ok(val) = std::env::var("SWITCHYARD_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("SWITCHYARD_LOG_FORMAT") {
            match val.to_lowercase().as_str() {
                "text" => self.logging.format = LogFormat::Text,
                "json" => self.logging.format = LogFormat::Json,
                _ => warn!("Invalid SWITCHYARD_LOG_FORMAT '{}', keeping configured value", val),
            }
        }

        // Routing settings
        if let Ok(val) = std::env::var("SWITCHYARD_STRATEGY") {
            match val.parse::<RoutingStrategy>() {
                Ok(strategy) => self.routing.strategy = Some(strategy),
                Err(e) => warn!("Ignoring SWITCHYARD_STRATEGY: {}", e),
            }
        }

        // Failover settings
        if let Some(attempts) = parse_env::<u32>("SWITCHYARD_MAX_RETRY_ATTEMPTS") {
            self.failover.max_retry_attempts = attempts;
        }

        if let Some(secs) = parse_env::<f64>("SWITCHYARD_ATTEMPT_TIMEOUT_SECS")
            && let Ok(timeout) = Duration::try_from_secs_f64(secs)
        {
            self.failover.attempt_timeout = timeout;
        }

        if let Some(enabled) = parse_env::<bool>("SWITCHYARD_CONTEXT_PRESERVATION") {
            self.failover.enable_context_preservation = enabled;
        }

        // Circuit breaker settings
        if let Some(threshold) = parse_env::<u32>("SWITCHYARD_FAILURE_THRESHOLD") {
            self.failover.circuit_breaker.failure_threshold = threshold;
        }

        if let Some(secs) = parse_env::<f64>("SWITCHYARD_OPEN_DURATION_SECS")
            && let Ok(duration) = Duration::try_from_secs_f64(secs)
        {
            self.failover.circuit_breaker.open_duration = duration;
        }
    }

    /// Validate every section
    ///
    /// # Errors
    /// `Error::ConfigValidation` naming the first problem found
    pub fn validate(&self) -> Result<()> {
        self.failover.validate().map_err(Error::ConfigValidation)?;

        for rule in &self.routing.rules {
            rule.validate().map_err(Error::ConfigValidation)?;
        }

        for (workload, profile) in &self.routing.workload_profiles {
            if !(0.0..=1.0).contains(&profile.cost_sensitivity) {
                return Err(Error::ConfigValidation(format!(
                    "workload profile '{}': cost_sensitivity must be between 0 and 1",
                    workload
                )));
            }
            if let Some((kind, _)) = profile.affinity.iter().find(|(_, factor)| **factor <= 0.0) {
                return Err(Error::ConfigValidation(format!(
                    "workload profile '{}': affinity for {} must be positive",
                    workload, kind
                )));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "logging.level must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Failover policy with the routing strategy override applied
    pub fn effective_failover(&self) -> FailoverConfig {
        let mut failover = self.failover.clone();
        if let Some(strategy) = self.routing.strategy {
            failover.default_strategy = strategy;
        }
        failover
    }

    /// Router builder preloaded with this config's policy, rules and profiles
    pub fn router_builder(&self, registry: Arc<dyn ProviderRegistry>) -> FailoverRouterBuilder {
        FailoverRouter::builder(registry)
            .config(self.effective_failover())
            .rules(self.routing.rules.clone())
            .workload_profiles(self.routing.workload_profiles.clone())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Invalid {} '{}', keeping configured value", name, val);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use switchyard_core::StaticRegistry;
    use switchyard_core::provider::{Capability, ProviderKind};
    use switchyard_routing::FailureType;

    const YAML: &str = r#"
failover:
  max_retry_attempts: 4
  retry_delays: [0.5, 1, 2]
  attempt_timeout: 10
  circuit_breaker:
    failure_threshold: 3
    open_duration: 120
  failure_patterns:
    rate_limit:
      retry_delay: 30
      max_retries: 1
      switch_threshold: 2
routing:
  strategy: cost-first
  rules:
    - priority: 10
      name: chinese
      matcher:
        type: language
        language: zh
      providers: [deepseek]
  workload_profiles:
    triage:
      preferred_capabilities: [fast_response]
      cost_sensitivity: 0.7
      affinity:
        openai: 1.1
logging:
  level: debug
  format: json
"#;

    #[test]
    fn test_parse_yaml() {
        let config = SwitchyardConfig::parse(YAML, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.failover.max_retry_attempts, 4);
        assert_eq!(config.failover.retry_delays[0], Duration::from_millis(500));
        assert_eq!(config.failover.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.failover.circuit_breaker.failure_threshold, 3);
        // Unset fields keep their defaults
        assert_eq!(config.failover.circuit_breaker.success_threshold, 3);

        let rate_limit = config.failover.policy_for(FailureType::RateLimit);
        assert_eq!(rate_limit.retry_delay, Duration::from_secs(30));
        assert_eq!(rate_limit.max_retries, 1);

        assert_eq!(config.routing.strategy, Some(RoutingStrategy::CostFirst));
        assert_eq!(config.routing.rules.len(), 1);
        let triage = &config.routing.workload_profiles["triage"];
        assert_eq!(triage.preferred_capabilities, vec![Capability::FastResponse]);
        assert_eq!(triage.affinity[&ProviderKind::OpenAI], 1.1);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[failover]
max_retry_attempts = 2
retry_delays = [1.0, 2.0]

[failover.circuit_breaker]
failure_threshold = 2

[routing]
strategy = "performance-first"

[[routing.rules]]
priority = 1
providers = ["anthropic"]

[routing.rules.matcher]
type = "workload"
pattern = "^compliance$"

[logging]
level = "warn"
"#;
        let config = SwitchyardConfig::parse(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.failover.max_retry_attempts, 2);
        assert_eq!(config.failover.circuit_breaker.failure_threshold, 2);
        assert_eq!(
            config.routing.strategy,
            Some(RoutingStrategy::PerformanceFirst)
        );
        assert_eq!(config.routing.rules[0].providers, vec!["anthropic"]);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = SwitchyardConfig::parse("{}", ConfigFormat::Yaml).unwrap();
        assert_eq!(config.failover, FailoverConfig::default());
        assert!(config.routing.rules.is_empty());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_parse_errors() {
        let err = SwitchyardConfig::parse("failover: [", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("YAML")));

        let err = SwitchyardConfig::parse("failover = ", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TOML")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SwitchyardConfig::default();
        config.failover.max_retry_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigValidation(_))
        ));

        let config = SwitchyardConfig::parse(
            "routing:\n  rules:\n    - matcher: {type: workload, pattern: \"(sales\"}\n      providers: [a]\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = SwitchyardConfig::parse(
            "routing:\n  workload_profiles:\n    x:\n      preferred_capabilities: []\n      cost_sensitivity: 1.5\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cost_sensitivity"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/config.toml")),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.yml")),
            ConfigFormat::Yaml
        );
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Yaml);
    }

    #[test]
    fn test_yaml_round_trip_keeps_policy() {
        let config = SwitchyardConfig::parse(YAML, ConfigFormat::Yaml).unwrap();
        let text = config.to_text(ConfigFormat::Yaml).unwrap();
        let reparsed = SwitchyardConfig::parse(&text, ConfigFormat::Yaml).unwrap();
        assert_eq!(reparsed.failover, config.failover);
        assert_eq!(reparsed.routing.strategy, config.routing.strategy);
    }

    #[test]
    #[serial]
    fn test_merge_env() {
        unsafe {
            std::env::set_var("SWITCHYARD_LOG_LEVEL", "trace");
            std::env::set_var("SWITCHYARD_LOG_FORMAT", "json");
            std::env::set_var("SWITCHYARD_STRATEGY", "language_optimized");
            std::env::set_var("SWITCHYARD_MAX_RETRY_ATTEMPTS", "6");
            std::env::set_var("SWITCHYARD_ATTEMPT_TIMEOUT_SECS", "2.5");
            std::env::set_var("SWITCHYARD_FAILURE_THRESHOLD", "9");
            std::env::set_var("SWITCHYARD_OPEN_DURATION_SECS", "60");
            std::env::set_var("SWITCHYARD_CONTEXT_PRESERVATION", "false");
        }

        let mut config = SwitchyardConfig::default();
        config.merge_env();

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.routing.strategy,
            Some(RoutingStrategy::LanguageOptimized)
        );
        assert_eq!(config.failover.max_retry_attempts, 6);
        assert_eq!(config.failover.attempt_timeout, Duration::from_millis(2500));
        assert_eq!(config.failover.circuit_breaker.failure_threshold, 9);
        assert_eq!(
            config.failover.circuit_breaker.open_duration,
            Duration::from_secs(60)
        );
        assert!(!config.failover.enable_context_preservation);

        unsafe {
            for name in [
                "SWITCHYARD_LOG_LEVEL",
                "SWITCHYARD_LOG_FORMAT",
                "SWITCHYARD_STRATEGY",
                "SWITCHYARD_MAX_RETRY_ATTEMPTS",
                "SWITCHYARD_ATTEMPT_TIMEOUT_SECS",
                "SWITCHYARD_FAILURE_THRESHOLD",
                "SWITCHYARD_OPEN_DURATION_SECS",
                "SWITCHYARD_CONTEXT_PRESERVATION",
            ] {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_merge_env_ignores_invalid_values() {
        unsafe {
            std::env::set_var("SWITCHYARD_MAX_RETRY_ATTEMPTS", "lots");
            std::env::set_var("SWITCHYARD_STRATEGY", "fastest");
        }

        let mut config = SwitchyardConfig::default();
        config.merge_env();
        assert_eq!(config.failover.max_retry_attempts, 3);
        assert_eq!(config.routing.strategy, None);

        unsafe {
            std::env::remove_var("SWITCHYARD_MAX_RETRY_ATTEMPTS");
            std::env::remove_var("SWITCHYARD_STRATEGY");
        }
    }

    #[test]
    fn test_router_builder_applies_config() {
        let config = SwitchyardConfig::parse(YAML, ConfigFormat::Yaml).unwrap();
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let router = config.router_builder(registry).build().unwrap();

        assert_eq!(router.config().max_retry_attempts, 4);
        assert_eq!(
            router.config().default_strategy,
            RoutingStrategy::CostFirst
        );
        assert_eq!(router.rules().rules().len(), 1);
    }
}
