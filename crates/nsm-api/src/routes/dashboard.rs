//! # Dashboard API
//!
//! Tile counts and the recent-activity feed shown on the admin landing page.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::db::{ActivityEntry, DashboardStats};
use crate::error::AppError;
use crate::state::AppState;

/// Events shown in the activity feed.
const ACTIVITY_FEED_LEN: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stats", get(stats))
        .route("/dashboard/activity", get(activity))
}

/// GET /dashboard/stats: Customer, subscription, usage and failure counts.
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    responses(
        (status = 200, description = "Dashboard counts", body = DashboardStats),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "dashboard"
)]
async fn stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.store.dashboard_stats().await?))
}

/// GET /dashboard/activity: The ten most recent monitoring events.
#[utoipa::path(
    get,
    path = "/dashboard/activity",
    responses(
        (status = 200, description = "Recent events, newest first", body = [ActivityEntry]),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "dashboard"
)]
async fn activity(State(state): State<AppState>) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    Ok(Json(state.store.recent_activity(ACTIVITY_FEED_LEN).await?))
}
