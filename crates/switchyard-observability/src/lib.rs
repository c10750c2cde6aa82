//! Switchyard Observability
//!
//! This crate provides observability features for the failover router:
//! - Metrics collection (Prometheus), fed through `OutcomeObserver`
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, LoggingConfig, init_tracing};
pub use metrics::Metrics;
