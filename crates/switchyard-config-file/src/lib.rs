//! File-based configuration for Switchyard deployments
//!
//! Loads the failover policy, routing rules, workload profiles and logging
//! settings from a YAML or TOML file, with `SWITCHYARD_*` environment
//! variables taking precedence.
//!
//! # Features
//! - YAML (default) and TOML formats, chosen by file extension
//! - `~` expansion in the config path
//! - Validation before a config is handed out
//! - Real-time file watching with `notify`
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use switchyard_config_file::FileConfigSource;
//! # use switchyard_core::StaticRegistry;
//! # fn example() -> switchyard_core::Result<()> {
//! let source = FileConfigSource::new("~/.switchyard/config.yaml")?;
//! let config = source.load()?;
//! let registry = Arc::new(StaticRegistry::new(vec![]));
//! let router = config.router_builder(registry).build();
//! # Ok(())
//! # }
//! ```

mod config;
mod file_source;

pub use config::{ConfigFormat, RoutingSection, SwitchyardConfig};
pub use file_source::{ConfigUpdate, ConfigUpdateStream, FileConfigSource};
