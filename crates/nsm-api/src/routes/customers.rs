//! # Customer Management API
//!
//! Customers are keyed by tenant id. Creating one also issues its APIM
//! subscription; deleting one also removes it (best effort). See
//! [`crate::provisioning`] for the cross-system semantics.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use nsm_core::{RequestLimits, TenantId, Tier, ValidationError};

use crate::db::CustomerSummary;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::provisioning::{self, DeleteOutcome, NewCustomer};
use crate::state::AppState;

/// Create-customer request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCustomerRequest {
    pub customer_name: String,
    pub tenant_id: String,
    /// Defaults to `standard`.
    #[serde(default)]
    pub tier: Option<String>,
    /// Defaults to 1000.
    #[serde(default)]
    pub requests_per_hour: Option<i64>,
    /// Defaults to 10000.
    #[serde(default)]
    pub requests_per_day: Option<i64>,
}

impl Validate for CreateCustomerRequest {
    type Valid = NewCustomer;

    fn validate(self) -> Result<NewCustomer, AppError> {
        let customer_name = self.customer_name.trim();
        if customer_name.is_empty() {
            return Err(ValidationError::EmptyCustomerName.into());
        }
        let tier = match self.tier {
            Some(raw) => Tier::new(raw)?,
            None => Tier::default(),
        };

        Ok(NewCustomer {
            tenant: TenantId::new(&self.tenant_id)?,
            customer_name: customer_name.to_string(),
            tier,
            limits: RequestLimits::from_overrides(self.requests_per_hour, self.requests_per_day)?,
        })
    }
}

/// Create-customer response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateCustomerResponse {
    /// The tenant id.
    pub customer_id: String,
    pub customer_name: String,
    /// Primary key of the new APIM subscription.
    pub api_key: String,
    pub tier: String,
    /// Always `created`.
    pub status: String,
}

/// Delete-customer response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteCustomerResponse {
    /// Always `deleted`.
    pub status: String,
    /// `{"outcome": "deleted" | "deleted_locally" | "no_subscription", ...}`
    #[schema(value_type = Object)]
    pub control_plane: DeleteOutcome,
}

/// Key-rotation response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegenerateKeyResponse {
    pub new_key: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route("/customers/:customer_id", delete(delete_customer))
        .route(
            "/customers/:customer_id/regenerate-key",
            post(regenerate_key),
        )
}

/// GET /customers: Every customer with subscription and 30-day usage.
#[utoipa::path(
    get,
    path = "/customers",
    responses(
        (status = 200, description = "Customers ordered by name", body = [CustomerSummary]),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "customers"
)]
async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerSummary>>, AppError> {
    Ok(Json(state.store.list_customers().await?))
}

/// POST /customers: Record a customer and issue its API key.
#[utoipa::path(
    post,
    path = "/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 200, description = "Customer provisioned", body = CreateCustomerResponse),
        (status = 400, description = "Malformed or blank input", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 409, description = "Tenant already exists", body = crate::error::ErrorBody),
        (status = 500, description = "Store or control-plane failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "customers"
)]
async fn create_customer(
    State(state): State<AppState>,
    body: Result<Json<CreateCustomerRequest>, JsonRejection>,
) -> Result<Json<CreateCustomerResponse>, AppError> {
    let customer = extract_validated_json(body)?;
    let created = provisioning::provision_customer(
        state.store.as_ref(),
        state.control_plane.as_ref(),
        customer,
    )
    .await?;

    Ok(Json(CreateCustomerResponse {
        customer_id: created.tenant.to_string(),
        customer_name: created.customer_name,
        api_key: created.api_key,
        tier: created.tier.as_str().to_string(),
        status: "created".into(),
    }))
}

/// DELETE /customers/{customer_id}: Remove a customer and its subscription.
#[utoipa::path(
    delete,
    path = "/customers/{customer_id}",
    params(("customer_id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Store rows removed", body = DeleteCustomerResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "customers"
)]
async fn delete_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<DeleteCustomerResponse>, AppError> {
    let outcome = provisioning::delete_customer(
        state.store.as_ref(),
        state.control_plane.as_ref(),
        &customer_id,
    )
    .await?;

    Ok(Json(DeleteCustomerResponse {
        status: "deleted".into(),
        control_plane: outcome,
    }))
}

/// POST /customers/{customer_id}/regenerate-key: Rotate the API key.
#[utoipa::path(
    post,
    path = "/customers/{customer_id}/regenerate-key",
    params(("customer_id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Key rotated", body = RegenerateKeyResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 404, description = "No subscription for tenant", body = crate::error::ErrorBody),
        (status = 500, description = "Control-plane failure or key drift", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "customers"
)]
async fn regenerate_key(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<RegenerateKeyResponse>, AppError> {
    let new_key = provisioning::rotate_key(
        state.store.as_ref(),
        state.control_plane.as_ref(),
        &customer_id,
    )
    .await?;

    Ok(Json(RegenerateKeyResponse { new_key }))
}
