//! # nsm-api -- Admin API for Numberskills Monitoring
//!
//! Operators use this service to provision customers, hand out and rotate
//! gateway API keys, and read usage and failure analytics. Customer records
//! live in the relational store; API keys are APIM subscriptions managed
//! through [`nsm_apim_client`].
//!
//! ## API Surface
//!
//! | Path                                   | Module                   |
//! |----------------------------------------|--------------------------|
//! | `GET /health`                          | [`routes::health`]       |
//! | `GET /dashboard/stats`                 | [`routes::dashboard`]    |
//! | `GET /dashboard/activity`              | [`routes::dashboard`]    |
//! | `GET, POST /customers`                 | [`routes::customers`]    |
//! | `DELETE /customers/:id`                | [`routes::customers`]    |
//! | `POST /customers/:id/regenerate-key`   | [`routes::customers`]    |
//! | `GET /analytics?days=N`                | [`routes::analytics`]    |
//! | `GET /openapi.json`                    | [`openapi`]              |
//!
//! Every path is nested under the configured route prefix (e.g. `/api`)
//! when one is set.
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! CorsLayer → TraceLayer → AuthMiddleware → Handler
//! ```
//!
//! `/health` sits outside the auth middleware. CORS is outermost so
//! preflight requests are answered without a token.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod provisioning;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::{Extension, Router};

use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let verifier = state.verifier.clone();
    let prefix = state.config.route_prefix.clone();
    let cors = middleware::cors::layer(&state.config.cors_origins);

    let api = Router::new()
        .merge(routes::dashboard::router())
        .merge(routes::customers::router())
        .merge(routes::analytics::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(Extension(verifier))
        .with_state(state);

    let routes = Router::new().merge(routes::health::router()).merge(api);

    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };

    let router = router.layer(middleware::tracing_layer::layer());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Normalise a configured route prefix to `""` or `/segment[/segment...]`.
pub fn normalize_route_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
