//! Routing errors surfaced to callers

use crate::failure::{FailureRecord, FailureType};
use switchyard_core::{ProviderError, TenantId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    /// Selection was handed an empty candidate list
    #[error("No eligible provider")]
    NoEligibleProvider,

    /// Every provider was filtered out (registry empty or all breakers open)
    #[error("No viable provider for tenant '{tenant}' ({} failed attempt(s))", trail.len())]
    NoViableProvider {
        tenant: TenantId,
        trail: Vec<FailureRecord>,
    },

    /// The failure policy gave up before the attempt budget ran out
    #[error("Provider '{provider}' failed with {failure_type}: {last_error}")]
    FailFast {
        provider: String,
        failure_type: FailureType,
        last_error: ProviderError,
        trail: Vec<FailureRecord>,
    },

    /// All attempts were used without a success
    #[error("All {attempts} attempts failed; last error from '{provider}': {last_error}")]
    Exhausted {
        attempts: u32,
        provider: String,
        last_error: ProviderError,
        trail: Vec<FailureRecord>,
    },

    #[error(transparent)]
    Core(#[from] switchyard_core::Error),
}

impl RoutingError {
    /// Ordered failure records collected before giving up
    pub fn trail(&self) -> &[FailureRecord] {
        match self {
            RoutingError::NoViableProvider { trail, .. }
            | RoutingError::FailFast { trail, .. }
            | RoutingError::Exhausted { trail, .. } => trail,
            RoutingError::NoEligibleProvider | RoutingError::Core(_) => &[],
        }
    }

    /// The provider error that ended the request, if one did
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            RoutingError::FailFast { last_error, .. } | RoutingError::Exhausted { last_error, .. } => {
                Some(last_error)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;
