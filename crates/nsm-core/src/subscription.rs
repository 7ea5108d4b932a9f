//! # Subscription Primitives
//!
//! Naming and limits for the gateway subscription issued to each customer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tenant::TenantId;

/// Number of tenant characters carried into the subscription id.
const SID_TENANT_CHARS: usize = 8;

/// Control-plane subscription identifier, `sub-{first 8 chars of tenant}`.
///
/// Two tenants sharing an 8-character prefix map to the same id; the control
/// plane's create-or-update then overwrites the earlier subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionSid(String);

impl SubscriptionSid {
    /// Derive the subscription id for a tenant.
    pub fn for_tenant(tenant: &TenantId) -> Self {
        Self(format!("sub-{}", tenant.prefix(SID_TENANT_CHARS)))
    }

    /// Wrap a subscription id returned by the control plane.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionSid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription tier label. Free-form; defaults to `standard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(String);

impl Tier {
    /// The tier assigned when a request omits one.
    pub const DEFAULT: &'static str = "standard";

    /// Validate a tier label.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTier);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

/// Per-subscription request quotas mirrored into the store.
///
/// Enforcement happens at the gateway; this service only records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLimits {
    /// Requests allowed per hour.
    pub per_hour: i32,
    /// Requests allowed per day.
    pub per_day: i32,
}

impl RequestLimits {
    /// Hourly limit applied when a request omits one.
    pub const DEFAULT_PER_HOUR: i32 = 1000;
    /// Daily limit applied when a request omits one.
    pub const DEFAULT_PER_DAY: i32 = 10_000;

    /// Build limits from optional overrides, applying defaults and rejecting
    /// non-positive values.
    pub fn from_overrides(
        per_hour: Option<i64>,
        per_day: Option<i64>,
    ) -> Result<Self, ValidationError> {
        let per_hour = positive(
            "requests_per_hour",
            per_hour.unwrap_or(i64::from(Self::DEFAULT_PER_HOUR)),
        )?;
        let per_day = positive(
            "requests_per_day",
            per_day.unwrap_or(i64::from(Self::DEFAULT_PER_DAY)),
        )?;
        Ok(Self { per_hour, per_day })
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            per_hour: Self::DEFAULT_PER_HOUR,
            per_day: Self::DEFAULT_PER_DAY,
        }
    }
}

fn positive(field: &'static str, value: i64) -> Result<i32, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NonPositiveLimit { field, value });
    }
    i32::try_from(value).map_err(|_| ValidationError::NonPositiveLimit { field, value })
}
