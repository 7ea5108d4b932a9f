//! # API Route Modules
//!
//! - `health`: unauthenticated liveness check.
//! - `dashboard`: tile counts and the recent-activity feed.
//! - `customers`: list, provision, delete, and key rotation.
//! - `analytics`: usage, SLA and failure reports over a trailing window.

pub mod analytics;
pub mod customers;
pub mod dashboard;
pub mod health;
