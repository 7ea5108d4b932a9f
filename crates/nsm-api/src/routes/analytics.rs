//! # Analytics API
//!
//! Usage, SLA and failure reports over a trailing window of `days`
//! (default 30, 1..=3650).

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use nsm_core::LookbackDays;

use crate::db::{FailureGroup, SlaMetric, UsageByCustomer};
use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

/// Failure groups returned in `topFailures`.
const TOP_FAILURES_LEN: i64 = 5;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsParams {
    /// Trailing window in days. Default 30.
    pub days: Option<i64>,
}

/// Analytics report.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub usage_by_customer: Vec<UsageByCustomer>,
    pub sla_metrics: Vec<SlaMetric>,
    pub top_failures: Vec<FailureGroup>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}

/// GET /analytics: Usage, SLA and top failures for the trailing window.
#[utoipa::path(
    get,
    path = "/analytics",
    params(AnalyticsParams),
    responses(
        (status = 200, description = "Analytics report", body = AnalyticsReport),
        (status = 400, description = "Invalid days", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "analytics"
)]
async fn analytics(
    State(state): State<AppState>,
    params: Result<Query<AnalyticsParams>, QueryRejection>,
) -> Result<Json<AnalyticsReport>, AppError> {
    let params = extract_query(params)?;
    let window = match params.days {
        Some(days) => LookbackDays::new(days)?,
        None => LookbackDays::default(),
    };

    let usage_by_customer = state.store.usage_by_customer(window).await?;
    let sla_metrics = state.store.sla_metrics(window).await?;
    let top_failures = state.store.top_failures(window, TOP_FAILURES_LEN).await?;

    tracing::debug!(
        days = window.days(),
        customers = usage_by_customer.len(),
        "analytics report built"
    );

    Ok(Json(AnalyticsReport {
        usage_by_customer,
        sla_metrics,
        top_failures,
    }))
}
