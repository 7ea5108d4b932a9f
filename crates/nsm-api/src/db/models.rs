//! Records returned by [`AdminStore`](super::AdminStore) and serialised
//! directly as response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use nsm_core::{ActivityKind, RequestLimits, TenantId, Tier};

/// Dashboard tile counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Rows in `Customers`.
    pub total_customers: i64,
    /// Active subscriptions that have not expired.
    pub active_subscriptions: i64,
    /// Usage rows in the trailing 30 days.
    pub total_api_calls: i64,
    /// `execution_failed` events in the trailing 7 days.
    pub recent_failures: i64,
}

/// One line of the dashboard activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivityEntry {
    pub customer_name: String,
    pub notebook_name: String,
    pub status: String,
    /// `success` iff `status == "completed"`, otherwise `failed`.
    #[serde(rename = "type")]
    #[schema(value_type = String, example = "success")]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
}

/// A customer with its subscription and recent usage.
///
/// Subscription fields are `null` when the customer has no subscription row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerSummary {
    pub customer_name: String,
    pub tenant_id: String,
    pub subscription_key: Option<String>,
    pub tier: Option<String>,
    /// `false` when there is no subscription row.
    pub is_active: bool,
    pub requests_per_hour: Option<i32>,
    pub requests_per_day: Option<i32>,
    /// Usage rows in the trailing 30 days.
    pub usage_30d: i64,
}

/// Subscription row written when a customer is provisioned.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub tenant: TenantId,
    /// Mirrors the customer display name.
    pub subscription_name: String,
    pub subscription_key: String,
    pub tier: Tier,
    pub limits: RequestLimits,
}

/// Row counts removed by a customer delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedRows {
    pub subscriptions: u64,
    pub customers: u64,
}

/// `usageByCustomer` analytics entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageByCustomer {
    pub customer_name: String,
    pub total_requests: i64,
    /// Mean response time, rounded to the nearest millisecond.
    pub avg_response_time_ms: i64,
    /// Percentage of requests with status >= 400, two decimal places.
    pub error_rate: f64,
}

/// `slaMetrics` analytics entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlaMetric {
    pub customer_name: String,
    pub total_runs: i64,
    /// Runs with status `failed`.
    pub failures: i64,
    /// Percentage of runs not failed, two decimal places.
    pub success_rate: f64,
}

/// `topFailures` analytics entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailureGroup {
    pub customer_name: String,
    pub notebook_name: String,
    pub error_message: Option<String>,
    pub count: i64,
    pub last_occurrence: DateTime<Utc>,
}

/// Percentage of `part` in `whole`, rounded to two decimal places.
pub(crate) fn percent_2dp(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 10_000.0 / whole as f64).round() / 100.0
}
