//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json` behind the auth middleware.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Entra ID bearer scheme referenced by every protected path.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Entra ID access token (RS256) for the admin API audience."))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the admin API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Numberskills Monitoring Admin API",
        version = "0.1.0",
        description = "Operator API for Numberskills Monitoring: customer provisioning, gateway subscription keys, dashboard counts, and usage/failure analytics.\n\nAuthentication: `Authorization: Bearer <token>` issued by Entra ID. `/health` is unauthenticated."
    ),
    paths(
        crate::routes::health::health,
        crate::routes::dashboard::stats,
        crate::routes::dashboard::activity,
        crate::routes::customers::list_customers,
        crate::routes::customers::create_customer,
        crate::routes::customers::delete_customer,
        crate::routes::customers::regenerate_key,
        crate::routes::analytics::analytics,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::routes::health::HealthResponse,
            crate::db::DashboardStats,
            crate::db::ActivityEntry,
            crate::db::CustomerSummary,
            crate::db::UsageByCustomer,
            crate::db::SlaMetric,
            crate::db::FailureGroup,
            crate::routes::customers::CreateCustomerRequest,
            crate::routes::customers::CreateCustomerResponse,
            crate::routes::customers::DeleteCustomerResponse,
            crate::routes::customers::RegenerateKeyResponse,
            crate::routes::analytics::AnalyticsReport,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness check"),
        (name = "dashboard", description = "Landing-page counts and recent activity"),
        (name = "customers", description = "Customer provisioning and API key management"),
        (name = "analytics", description = "Usage, SLA and failure reports"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
