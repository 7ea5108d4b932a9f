//! # Tenant Identifier
//!
//! The tenant identifier is the unique key for a customer. It is shared by the
//! relational store (`Customers.tenant_id`, `*.customer_id`), the control
//! plane (as the seed of the subscription id), and the identity provider.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Width of the `tenant_id` column.
pub const MAX_TENANT_ID_LEN: usize = 128;

/// A validated customer tenant identifier.
///
/// Leading and trailing whitespace is stripped on construction. Only ASCII
/// alphanumerics, `-`, `_` and `.` are accepted because the identifier seeds
/// an ARM resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a tenant identifier.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTenantId);
        }
        let len = trimmed.chars().count();
        if len > MAX_TENANT_ID_LEN {
            return Err(ValidationError::TenantIdTooLong {
                max: MAX_TENANT_ID_LEN,
                len,
            });
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(ValidationError::InvalidTenantChar(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `n` characters of the identifier (or all of it if shorter).
    pub fn prefix(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
