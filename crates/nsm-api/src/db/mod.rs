//! # Data Store Gateway
//!
//! Read and write access to the four admin tables via [`AdminStore`].
//!
//! ## Backends
//!
//! - [`postgres::PgStore`]: PostgreSQL via SQLx. Used whenever a connection
//!   string is configured.
//! - [`memory::MemoryStore`]: process-local tables for development mode and
//!   handler tests.
//!
//! ## Tables
//!
//! | Table | Written by |
//! |-------|------------|
//! | `Customers` | this service |
//! | `ApiSubscriptions` | this service |
//! | `ApiUsageLog` | the gateway |
//! | `MonitoringEvents` | the monitoring agents |
//!
//! The tenant identifier is the join key everywhere
//! (`Customers.tenant_id` = `*.customer_id`).

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use nsm_core::{LookbackDays, TenantId};

pub use models::{
    ActivityEntry, CustomerSummary, DashboardStats, FailureGroup, NewSubscription, RemovedRows,
    SlaMetric, UsageByCustomer,
};

/// Dashboard "total API calls" window.
pub const API_CALLS_WINDOW_DAYS: i32 = 30;
/// Dashboard "recent failures" window.
pub const RECENT_FAILURES_WINDOW_DAYS: i32 = 7;
/// `usage_30d` window on the customer list.
pub const CUSTOMER_USAGE_WINDOW_DAYS: i32 = 30;

/// Data store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A customer row for this tenant already exists.
    #[error("Customer with tenant_id {0} already exists")]
    Duplicate(String),

    /// Query or connection failure.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Operations the request handlers perform against the relational store.
///
/// Every method acquires its own connection (or transaction) and releases it
/// on all exit paths.
#[async_trait]
pub trait AdminStore: Send + Sync + std::fmt::Debug {
    /// Counts for the dashboard tiles.
    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError>;

    /// The `limit` most recent monitoring events joined to their customer.
    async fn recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError>;

    /// Every customer with its subscription (if any) and 30-day usage count,
    /// ordered by customer name.
    async fn list_customers(&self) -> Result<Vec<CustomerSummary>, StoreError>;

    /// Insert a customer row. Fails with [`StoreError::Duplicate`] if the
    /// tenant already exists.
    async fn insert_customer(&self, tenant: &TenantId, customer_name: &str)
        -> Result<(), StoreError>;

    /// Insert the subscription row for a customer.
    async fn insert_subscription(&self, subscription: &NewSubscription) -> Result<(), StoreError>;

    /// The stored subscription key for a tenant, if a subscription row exists.
    async fn subscription_key(&self, tenant: &str) -> Result<Option<String>, StoreError>;

    /// Replace a tenant's subscription key. Returns whether a row was updated.
    async fn update_subscription_key(&self, tenant: &str, key: &str) -> Result<bool, StoreError>;

    /// Delete the subscription and customer rows for a tenant in one
    /// transaction. Deleting an absent tenant is not an error.
    async fn delete_customer(&self, tenant: &str) -> Result<RemovedRows, StoreError>;

    /// Per-customer request volume, latency and error rate in the window,
    /// ordered by request count descending.
    async fn usage_by_customer(
        &self,
        window: LookbackDays,
    ) -> Result<Vec<UsageByCustomer>, StoreError>;

    /// Per-customer run counts and success rate in the window, ordered by
    /// success rate ascending. Customers with no runs are omitted.
    async fn sla_metrics(&self, window: LookbackDays) -> Result<Vec<SlaMetric>, StoreError>;

    /// The `limit` most frequent `(customer, notebook, error)` groups of
    /// `execution_failed` events in the window, ordered by count descending.
    async fn top_failures(
        &self,
        window: LookbackDays,
        limit: i64,
    ) -> Result<Vec<FailureGroup>, StoreError>;
}

/// Open a connection pool against `url`.
pub async fn init_pool(url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
