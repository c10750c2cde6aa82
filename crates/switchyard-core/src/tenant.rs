//! Tenant identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Identifier of the tenant a request is made on behalf of.
///
/// Circuit breakers and performance statistics are partitioned by tenant,
/// so one tenant's failing credentials never gate another tenant's traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant ID from a string
    ///
    /// Leading/trailing whitespace is trimmed. Empty identifiers are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidTenant(
                "Tenant ID must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_from_string() {
        let tenant_id: TenantId = "acme".parse().unwrap();
        assert_eq!(tenant_id.to_string(), "acme");
    }

    #[test]
    fn test_tenant_id_trims_whitespace() {
        let tenant_id = TenantId::new("  acme ").unwrap();
        assert_eq!(tenant_id.as_str(), "acme");
    }

    #[test]
    fn test_tenant_id_empty_string() {
        assert!(TenantId::new("").is_err());
        assert!("   ".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_tenant_id_default() {
        assert_eq!(TenantId::default().as_str(), "default");
    }
}
