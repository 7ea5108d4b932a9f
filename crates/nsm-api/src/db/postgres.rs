//! PostgreSQL-backed [`AdminStore`].
//!
//! All queries are parameterised. Multi-statement writes run in a
//! transaction that rolls back when dropped uncommitted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use nsm_core::{ActivityKind, LookbackDays, TenantId, EXECUTION_FAILED_EVENT, FAILED_STATUS};

use super::models::{
    ActivityEntry, CustomerSummary, DashboardStats, FailureGroup, NewSubscription, RemovedRows,
    SlaMetric, UsageByCustomer,
};
use super::{
    AdminStore, StoreError, API_CALLS_WINDOW_DAYS, CUSTOMER_USAGE_WINDOW_DAYS,
    RECENT_FAILURES_WINDOW_DAYS,
};

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT
                (SELECT COUNT(*) FROM Customers) AS total_customers,
                (SELECT COUNT(*) FROM ApiSubscriptions
                   WHERE is_active AND (expires_at IS NULL OR expires_at > NOW())) AS active_subscriptions,
                (SELECT COUNT(*) FROM ApiUsageLog
                   WHERE date_key >= CURRENT_DATE - $1::int) AS total_api_calls,
                (SELECT COUNT(*) FROM MonitoringEvents
                   WHERE event_type = $2
                     AND event_timestamp >= NOW() - make_interval(days => $3::int)) AS recent_failures",
        )
        .bind(API_CALLS_WINDOW_DAYS)
        .bind(EXECUTION_FAILED_EVENT)
        .bind(RECENT_FAILURES_WINDOW_DAYS)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_customers: row.total_customers,
            active_subscriptions: row.active_subscriptions,
            total_api_calls: row.total_api_calls,
            recent_failures: row.recent_failures,
        })
    }

    async fn recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT c.customer_name, e.notebook_name, e.status, e.event_timestamp
             FROM MonitoringEvents e
             JOIN Customers c ON e.customer_id = c.tenant_id
             ORDER BY e.event_timestamp DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRow::into_entry).collect())
    }

    async fn list_customers(&self) -> Result<Vec<CustomerSummary>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT
                c.customer_name,
                c.tenant_id,
                s.subscription_key,
                s.tier,
                s.is_active,
                s.requests_per_hour,
                s.requests_per_day,
                COUNT(l.id) AS usage_30d
             FROM Customers c
             LEFT JOIN ApiSubscriptions s ON c.tenant_id = s.customer_id
             LEFT JOIN ApiUsageLog l ON c.tenant_id = l.customer_id
                AND l.date_key >= CURRENT_DATE - $1::int
             GROUP BY c.customer_name, c.tenant_id, s.subscription_key,
                      s.tier, s.is_active, s.requests_per_hour, s.requests_per_day
             ORDER BY c.customer_name",
        )
        .bind(CUSTOMER_USAGE_WINDOW_DAYS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CustomerRow::into_summary).collect())
    }

    async fn insert_customer(
        &self,
        tenant: &TenantId,
        customer_name: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO Customers (tenant_id, customer_name) VALUES ($1, $2)")
            .bind(tenant.as_str())
            .bind(customer_name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::Duplicate(tenant.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_subscription(&self, subscription: &NewSubscription) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ApiSubscriptions (
                customer_id, subscription_name, subscription_key,
                tier, requests_per_hour, requests_per_day
             ) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(subscription.tenant.as_str())
        .bind(&subscription.subscription_name)
        .bind(&subscription.subscription_key)
        .bind(subscription.tier.as_str())
        .bind(subscription.limits.per_hour)
        .bind(subscription.limits.per_day)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn subscription_key(&self, tenant: &str) -> Result<Option<String>, StoreError> {
        let key = sqlx::query_scalar::<_, String>(
            "SELECT subscription_key FROM ApiSubscriptions WHERE customer_id = $1",
        )
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn update_subscription_key(&self, tenant: &str, key: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE ApiSubscriptions SET subscription_key = $1 WHERE customer_id = $2")
                .bind(key)
                .bind(tenant)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_customer(&self, tenant: &str) -> Result<RemovedRows, StoreError> {
        let mut tx = self.pool.begin().await?;

        let subscriptions = sqlx::query("DELETE FROM ApiSubscriptions WHERE customer_id = $1")
            .bind(tenant)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let customers = sqlx::query("DELETE FROM Customers WHERE tenant_id = $1")
            .bind(tenant)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(RemovedRows {
            subscriptions,
            customers,
        })
    }

    async fn usage_by_customer(
        &self,
        window: LookbackDays,
    ) -> Result<Vec<UsageByCustomer>, StoreError> {
        let rows = sqlx::query_as::<_, UsageRow>(
            "SELECT
                c.customer_name,
                COUNT(*) AS total_requests,
                AVG(l.response_time_ms)::float8 AS avg_response_time_ms,
                ROUND(SUM(CASE WHEN l.status_code >= 400 THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 2)::float8 AS error_rate
             FROM ApiUsageLog l
             JOIN Customers c ON l.customer_id = c.tenant_id
             WHERE l.date_key >= CURRENT_DATE - $1::int
             GROUP BY c.customer_name
             ORDER BY total_requests DESC, c.customer_name",
        )
        .bind(window.days())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| UsageByCustomer {
                customer_name: r.customer_name,
                total_requests: r.total_requests,
                avg_response_time_ms: r.avg_response_time_ms.unwrap_or(0.0).round() as i64,
                error_rate: r.error_rate.unwrap_or(0.0),
            })
            .collect())
    }

    async fn sla_metrics(&self, window: LookbackDays) -> Result<Vec<SlaMetric>, StoreError> {
        let rows = sqlx::query_as::<_, SlaRow>(
            "SELECT
                c.customer_name,
                COUNT(*) AS total_runs,
                SUM(CASE WHEN e.status = $2 THEN 1 ELSE 0 END) AS failures,
                ROUND((COUNT(*) - SUM(CASE WHEN e.status = $2 THEN 1 ELSE 0 END)) * 100.0 / COUNT(*), 2)::float8 AS success_rate
             FROM MonitoringEvents e
             JOIN Customers c ON e.customer_id = c.tenant_id
             WHERE e.event_timestamp >= NOW() - make_interval(days => $1::int)
             GROUP BY c.customer_name
             HAVING COUNT(*) > 0
             ORDER BY success_rate ASC, c.customer_name",
        )
        .bind(window.days())
        .bind(FAILED_STATUS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SlaMetric {
                customer_name: r.customer_name,
                total_runs: r.total_runs,
                failures: r.failures.unwrap_or(0),
                success_rate: r.success_rate.unwrap_or(0.0),
            })
            .collect())
    }

    async fn top_failures(
        &self,
        window: LookbackDays,
        limit: i64,
    ) -> Result<Vec<FailureGroup>, StoreError> {
        let rows = sqlx::query_as::<_, FailureRow>(
            "SELECT
                c.customer_name,
                e.notebook_name,
                e.error_message,
                COUNT(*) AS count,
                MAX(e.event_timestamp) AS last_occurrence
             FROM MonitoringEvents e
             JOIN Customers c ON e.customer_id = c.tenant_id
             WHERE e.event_type = $2
               AND e.event_timestamp >= NOW() - make_interval(days => $1::int)
             GROUP BY c.customer_name, e.notebook_name, e.error_message
             ORDER BY count DESC, last_occurrence DESC
             LIMIT $3",
        )
        .bind(window.days())
        .bind(EXECUTION_FAILED_EVENT)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| FailureGroup {
                customer_name: r.customer_name,
                notebook_name: r.notebook_name,
                error_message: r.error_message,
                count: r.count,
                last_occurrence: r.last_occurrence,
            })
            .collect())
    }
}

// -- Internal row types for SQLx mapping -------------------------------------

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_customers: i64,
    active_subscriptions: i64,
    total_api_calls: i64,
    recent_failures: i64,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    customer_name: String,
    notebook_name: String,
    status: String,
    event_timestamp: DateTime<Utc>,
}

impl ActivityRow {
    fn into_entry(self) -> ActivityEntry {
        ActivityEntry {
            kind: ActivityKind::from_status(&self.status),
            customer_name: self.customer_name,
            notebook_name: self.notebook_name,
            status: self.status,
            timestamp: self.event_timestamp,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    customer_name: String,
    tenant_id: String,
    subscription_key: Option<String>,
    tier: Option<String>,
    is_active: Option<bool>,
    requests_per_hour: Option<i32>,
    requests_per_day: Option<i32>,
    usage_30d: i64,
}

impl CustomerRow {
    fn into_summary(self) -> CustomerSummary {
        CustomerSummary {
            customer_name: self.customer_name,
            tenant_id: self.tenant_id,
            subscription_key: self.subscription_key,
            tier: self.tier,
            is_active: self.is_active.unwrap_or(false),
            requests_per_hour: self.requests_per_hour,
            requests_per_day: self.requests_per_day,
            usage_30d: self.usage_30d,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    customer_name: String,
    total_requests: i64,
    avg_response_time_ms: Option<f64>,
    error_rate: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct SlaRow {
    customer_name: String,
    total_runs: i64,
    failures: Option<i64>,
    success_rate: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    customer_name: String,
    notebook_name: String,
    error_message: Option<String>,
    count: i64,
    last_occurrence: DateTime<Utc>,
}
