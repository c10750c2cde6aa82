//! Switchyard Routing Engine
//!
//! This crate provides the routing-and-failover logic for Switchyard:
//! - Rule filtering, multi-factor scoring and weighted selection
//! - Per-(provider, tenant) circuit breakers
//! - Failure classification and retry/switch decisions
//! - Context adaptation when a request moves between providers
//! - The failover router that drives the attempt loop

pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod failure;
pub mod history;
pub mod learning;
pub mod outcome;
pub mod preserver;
pub mod recovery;
pub mod rules;
pub mod scoring;
pub mod selection;

// Re-export commonly used types
pub use circuit_breaker::{
    BreakerKey, BreakerStats, CircuitBreakerConfig, CircuitBreakerManager, CircuitState,
};
pub use config::{FailoverConfig, FailurePolicy};
pub use context::{RoutingContext, RoutingStrategy, Urgency};
pub use error::{Result, RoutingError};
pub use failure::{FailoverAction, FailureDetector, FailureRecord, FailureType};
pub use history::{FailureHistory, FailureStats};
pub use learning::{LearningTracker, PerformanceStats, RoutingStats};
pub use outcome::{AttemptOutcome, OutcomeObserver, RequestOutcome};
pub use preserver::{ContextPreserver, ConversationContext, ContinuityData, ProviderContext};
pub use recovery::{FailoverRouter, FailoverRouterBuilder, ProviderHealthCheck, SystemStats};
pub use rules::{RoutingRule, RuleEngine, RuleMatcher};
pub use scoring::{ProviderScore, ScoreWeights, ScoringEngine, WorkloadProfile};
pub use selection::select_provider;
