//! Failure Detector
//!
//! Classifies provider errors into a small taxonomy and decides what the
//! orchestrator should do next, based on the per-type policy table.

use crate::config::{FailoverConfig, FailurePolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use switchyard_core::{ProviderError, TenantId};

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Timeout,
    RateLimit,
    Authentication,
    ModelNotFound,
    NetworkError,
    QuotaExceeded,
    ApiError,
    Unknown,
}

impl FailureType {
    pub const ALL: [FailureType; 8] = [
        FailureType::Timeout,
        FailureType::RateLimit,
        FailureType::Authentication,
        FailureType::ModelNotFound,
        FailureType::NetworkError,
        FailureType::QuotaExceeded,
        FailureType::ApiError,
        FailureType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::ModelNotFound => "model_not_found",
            Self::NetworkError => "network_error",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ApiError => "api_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether retrying the same provider can ever help
    pub fn is_retryable_on_same_provider(&self) -> bool {
        !matches!(self, Self::Authentication | Self::ModelNotFound)
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverAction {
    RetrySame,
    SwitchProvider,
    /// The failure tripped the provider's breaker; move on without it
    CircuitBreak,
    FailFast,
}

impl FailoverAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrySame => "retry_same",
            Self::SwitchProvider => "switch_provider",
            Self::CircuitBreak => "circuit_break",
            Self::FailFast => "fail_fast",
        }
    }
}

/// Structured detail extracted from a provider error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub status_code: Option<u16>,
    pub retry_after_secs: Option<u64>,
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub request_id: String,
    pub provider: String,
    pub tenant: TenantId,
    pub failure_type: FailureType,
    pub timestamp: DateTime<Utc>,
    /// Cumulative attempt number within the request (1-based)
    pub attempt: u32,
    pub details: ErrorDetails,
}

// Ordered: the first matching group wins. "quota exceeded" must be checked
// before the rate-limit group, which also contains "quota".
const KEYWORDS: &[(FailureType, &[&str])] = &[
    (FailureType::Timeout, &["timeout", "timed out", "deadline exceeded"]),
    (FailureType::QuotaExceeded, &["quota exceeded", "insufficient_quota", "billing"]),
    (FailureType::RateLimit, &["rate limit", "rate_limit", "too many requests", "quota"]),
    (
        FailureType::Authentication,
        &["unauthorized", "authentication", "invalid api key", "forbidden"],
    ),
    (FailureType::ModelNotFound, &["model not found", "invalid model", "no such model"]),
    (FailureType::NetworkError, &["network", "connection", "dns", "reset by peer"]),
];

pub struct FailureDetector {
    patterns: BTreeMap<FailureType, FailurePolicy>,
    fallback: FailurePolicy,
}

impl FailureDetector {
    pub fn new(config: &FailoverConfig) -> Self {
        Self {
            patterns: config.failure_patterns.clone(),
            fallback: config.fallback_policy,
        }
    }

    /// Classify an error: structured variant first, then message keywords
    pub fn classify(&self, error: &ProviderError) -> FailureType {
        match error {
            ProviderError::Timeout(_) => FailureType::Timeout,
            ProviderError::RateLimited { .. } => FailureType::RateLimit,
            ProviderError::Authentication(_) => FailureType::Authentication,
            ProviderError::ModelNotFound(_) => FailureType::ModelNotFound,
            ProviderError::Network(_) => FailureType::NetworkError,
            ProviderError::QuotaExceeded(_) => FailureType::QuotaExceeded,
            ProviderError::Api { status, message } => classify_message(message)
                .or_else(|| classify_status(*status))
                .unwrap_or(FailureType::ApiError),
            ProviderError::Other(message) => {
                classify_message(message).unwrap_or(FailureType::Unknown)
            }
        }
    }

    pub fn policy(&self, failure_type: FailureType) -> FailurePolicy {
        self.patterns
            .get(&failure_type)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Decide the next step.
    ///
    /// `attempts_on_provider` counts failed attempts on the current provider,
    /// `total_attempts` counts all attempts made for the request so far.
    pub fn decide(
        &self,
        failure_type: FailureType,
        attempts_on_provider: u32,
        total_attempts: u32,
    ) -> FailoverAction {
        if !failure_type.is_retryable_on_same_provider() {
            return FailoverAction::SwitchProvider;
        }

        let policy = self.policy(failure_type);
        if attempts_on_provider <= policy.max_retries {
            FailoverAction::RetrySame
        } else if total_attempts <= policy.switch_threshold {
            FailoverAction::SwitchProvider
        } else {
            FailoverAction::FailFast
        }
    }

    pub fn error_details(error: &ProviderError) -> ErrorDetails {
        ErrorDetails {
            message: error.to_string(),
            status_code: error.status_code(),
            retry_after_secs: error.retry_after().map(|d| d.as_secs()),
        }
    }

    /// Classify `error` and wrap it in a record
    pub fn record(
        &self,
        request_id: &str,
        provider: &str,
        tenant: &TenantId,
        error: &ProviderError,
        attempt: u32,
    ) -> FailureRecord {
        FailureRecord {
            request_id: request_id.to_string(),
            provider: provider.to_string(),
            tenant: tenant.clone(),
            failure_type: self.classify(error),
            timestamp: Utc::now(),
            attempt,
            details: Self::error_details(error),
        }
    }
}

fn classify_message(message: &str) -> Option<FailureType> {
    let message = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| message.contains(w)))
        .map(|(failure_type, _)| *failure_type)
}

fn classify_status(status: u16) -> Option<FailureType> {
    match status {
        401 | 403 => Some(FailureType::Authentication),
        402 => Some(FailureType::QuotaExceeded),
        404 => Some(FailureType::ModelNotFound),
        408 | 504 => Some(FailureType::Timeout),
        429 => Some(FailureType::RateLimit),
        _ => None,
    }
}
