//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Every failure is rendered as a flat `{"error": "<message>"}` body, the
//! shape the admin frontend reads. This is an internal operator tool, so
//! 500 responses carry the underlying message verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use nsm_apim_client::ApimError;

use crate::db::StoreError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Lookup target missing (404).
    #[error("{0}")]
    NotFound(String),

    /// Malformed body or query, or a blank required field (400).
    #[error("{0}")]
    BadRequest(String),

    /// Conflict with existing state (409).
    #[error("{0}")]
    Conflict(String),

    /// Unclassified failure (500).
    #[error("{0}")]
    Internal(String),

    /// Control-plane call failed where the operation cannot proceed (500).
    #[error(transparent)]
    ControlPlane(#[from] ApimError),

    /// Data store failure (500).
    #[error(transparent)]
    Database(StoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::ControlPlane(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(tenant) => {
                Self::Conflict(format!("Customer with tenant_id {tenant} already exists"))
            }
            other => Self::Database(other),
        }
    }
}

impl From<nsm_core::ValidationError> for AppError {
    fn from(err: nsm_core::ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
