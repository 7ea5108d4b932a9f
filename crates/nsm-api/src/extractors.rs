//! # Custom Extractors & Validation
//!
//! Handlers take `Result<Json<T>, JsonRejection>` (or the `Query` equivalent)
//! and pass it through these helpers so every malformed input surfaces as
//! `400 {"error": ...}` instead of axum's plain-text rejection.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::error::AppError;

/// Request types that turn into a validated domain value.
pub trait Validate {
    /// The validated form of the request.
    type Valid;

    /// Check business rules and build the validated value.
    fn validate(self) -> Result<Self::Valid, AppError>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T::Valid, AppError> {
    extract_json(result)?.validate()
}

/// Extract query parameters, mapping rejections to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}
