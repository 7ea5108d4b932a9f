//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Built once in `main` from explicit configuration;
//! handlers never read the environment.

use std::net::SocketAddr;
use std::sync::Arc;

use nsm_apim_client::SubscriptionControlPlane;

use crate::auth::TokenVerifier;
use crate::db::AdminStore;

/// Deployment environment. Only `development` changes behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    /// Auth disabled; in-memory backends allowed.
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Process-level settings that shape the router.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Prefix for every route, e.g. `/api`. Empty for none.
    pub route_prefix: String,
    /// Origins allowed by CORS. Empty disables the CORS layer.
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Socket the server binds: every interface on `port`.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            route_prefix: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<dyn AdminStore>,
    pub control_plane: Arc<dyn SubscriptionControlPlane>,
    pub verifier: Arc<TokenVerifier>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AdminStore>,
        control_plane: Arc<dyn SubscriptionControlPlane>,
        verifier: Arc<TokenVerifier>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            control_plane,
            verifier,
            config,
        }
    }
}
