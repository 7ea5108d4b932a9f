#![deny(missing_docs)]

//! # nsm-core: Domain Primitives for the Monitoring Admin API
//!
//! Types shared by the API service and the control-plane client. This crate
//! has no internal dependencies and no I/O.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`TenantId`] is validated once at
//!    the edge and is the join key across every table and the control plane.
//!
//! 2. **Deterministic control-plane naming.** [`SubscriptionSid`] is derived
//!    from the tenant identifier and never stored separately.
//!
//! 3. **[`ValidationError`] for every rejected input.** No panics on bad
//!    input, no `.unwrap()` outside tests.

pub mod activity;
pub mod error;
pub mod subscription;
pub mod tenant;
pub mod window;

pub use activity::{ActivityKind, EXECUTION_FAILED_EVENT, FAILED_STATUS};
pub use error::ValidationError;
pub use subscription::{RequestLimits, SubscriptionSid, Tier};
pub use tenant::TenantId;
pub use window::LookbackDays;
