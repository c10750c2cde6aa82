//! Structured logging setup
//!
//! Installs a global `tracing` subscriber. `RUST_LOG`, when set, replaces the
//! configured level entirely.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Error returned when the subscriber can't be installed
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or full filter directive, e.g. `info` or `info,switchyard_routing=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Log every routing decision at info level
    #[serde(default = "default_true")]
    pub log_decisions: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_decisions: true,
        }
    }
}

/// Filter for `config`, unless `RUST_LOG` overrides it
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, InitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(config.level.to_lowercase())?;
    if !config.log_decisions {
        filter = filter.add_directive("switchyard_routing::recovery=warn".parse()?);
    }
    Ok(filter)
}

/// Install the global subscriber
///
/// # Errors
/// Fails on an unparseable level or if a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), InitError> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.log_decisions);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggingConfig = serde_yaml::from_str("format: json\n").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "info,switchyard_routing=debug".to_string(),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "switchyard=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_init_twice_fails() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
