//! Switchyard Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by the
//! routing engine and its collaborators:
//! - Completion request/response types
//! - Provider trait, capability model and registry
//! - Core error types

pub mod error;
pub mod normalized;
pub mod provider;
pub mod tenant;

pub use error::{Error, ProviderError, Result};
pub use provider::{Provider, ProviderRegistry, ProviderSnapshot, StaticRegistry};
pub use tenant::TenantId;
