//! # Validation Errors
//!
//! Rejections for domain primitives constructed from request input.

use thiserror::Error;

/// Domain primitive validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tenant identifier was empty or whitespace.
    #[error("tenant_id must not be empty")]
    EmptyTenantId,

    /// Tenant identifier exceeds the column width.
    #[error("tenant_id exceeds {max} characters (got {len})")]
    TenantIdTooLong {
        /// Maximum accepted length.
        max: usize,
        /// Length that was supplied.
        len: usize,
    },

    /// Tenant identifier contains characters that cannot appear in a
    /// control-plane resource name.
    #[error("tenant_id contains invalid character {0:?}")]
    InvalidTenantChar(char),

    /// Customer display name was empty or whitespace.
    #[error("customer_name must not be empty")]
    EmptyCustomerName,

    /// Tier label was empty or whitespace.
    #[error("tier must not be empty")]
    EmptyTier,

    /// A request limit was zero or negative.
    #[error("{field} must be positive (got {value})")]
    NonPositiveLimit {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: i64,
    },

    /// Analytics window outside the accepted range.
    #[error("days must be between 1 and {max} (got {value})")]
    LookbackOutOfRange {
        /// Largest accepted window.
        max: u16,
        /// Value that was supplied.
        value: i64,
    },
}
