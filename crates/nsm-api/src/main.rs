//! # nsm-api -- Binary Entry Point
//!
//! Parses configuration from flags and environment, wires the store, the
//! subscription control plane and the token verifier, then serves the admin
//! API.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nsm_apim_client::stub::InMemoryControlPlane;
use nsm_apim_client::{
    product_id_from_env, ApimClient, ApimConfig, ConfigError, SubscriptionControlPlane,
};

use nsm_api::auth::{jwks_url_for_tenant, AuthMode, JwtConfig, TokenVerifier};
use nsm_api::db::memory::MemoryStore;
use nsm_api::db::postgres::PgStore;
use nsm_api::db::AdminStore;
use nsm_api::state::{AppConfig, AppState, Environment};

/// Numberskills Monitoring admin API.
#[derive(Parser, Debug)]
#[command(name = "nsm-api", version, about, long_about = None)]
struct Cli {
    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Deployment environment. `development` disables auth.
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "production")]
    environment: Environment,

    /// Postgres connection string. Falls back to `DATABASE_URL`.
    #[arg(long, env = "SQL_CONNECTION_STRING", hide_env_values = true)]
    database_url: Option<String>,

    /// Apply the embedded schema migrations before serving.
    #[arg(long, env = "RUN_MIGRATIONS")]
    run_migrations: bool,

    /// Entra ID tenant that issues admin tokens.
    #[arg(long, env = "AZURE_TENANT_ID")]
    azure_tenant_id: Option<String>,

    /// Expected `aud` claim.
    #[arg(long, env = "AZURE_API_CLIENT_ID")]
    azure_api_client_id: Option<String>,

    /// Override the JWKS URL derived from the tenant.
    #[arg(long, env = "AZURE_JWKS_URL")]
    jwks_url: Option<String>,

    /// Seconds a fetched JWKS is trusted.
    #[arg(long, default_value_t = 300)]
    jwks_cache_ttl_secs: u64,

    /// Comma-separated CORS origins. `*` allows any.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Prefix for every route, e.g. `/api`.
    #[arg(long, env = "ROUTE_PREFIX", default_value = "")]
    route_prefix: String,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let development = cli.environment.is_development();
    if development {
        tracing::warn!("ENVIRONMENT=development: authentication is disabled");
    }

    let store = build_store(&cli, development).await?;
    let control_plane = build_control_plane(development)?;
    let verifier = Arc::new(build_verifier(&cli, development)?);

    let config = AppConfig {
        port: cli.port,
        route_prefix: nsm_api::normalize_route_prefix(&cli.route_prefix),
        cors_origins: cli
            .cors_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
    };

    let addr = config.listen_addr();
    let state = AppState::new(store, control_plane, verifier, config);
    let app = nsm_api::app(state);

    tracing::info!(%addr, "NSM admin API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(
    cli: &Cli,
    development: bool,
) -> Result<Arc<dyn AdminStore>, Box<dyn std::error::Error>> {
    let url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    match url {
        Some(url) => {
            let pool = nsm_api::db::init_pool(&url).await.map_err(|e| {
                tracing::error!("Database initialization failed: {e}");
                e
            })?;
            if cli.run_migrations {
                nsm_api::db::run_migrations(&pool).await?;
            }
            Ok(Arc::new(PgStore::new(pool)))
        }
        None if development => {
            tracing::warn!("no database configured; using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        None => Err("SQL_CONNECTION_STRING (or DATABASE_URL) is required outside development".into()),
    }
}

fn build_control_plane(
    development: bool,
) -> Result<Arc<dyn SubscriptionControlPlane>, Box<dyn std::error::Error>> {
    match ApimConfig::from_env() {
        Ok(config) => {
            let client = ApimClient::new(config).map_err(|e| {
                tracing::error!("Failed to create APIM client: {e}");
                e
            })?;
            tracing::info!(
                service = %client.config().service_name,
                product = %client.config().product_id,
                "APIM control plane configured"
            );
            Ok(Arc::new(client))
        }
        Err(ConfigError::Missing(var)) if development => {
            tracing::warn!("{var} not set; using in-memory control plane");
            Ok(Arc::new(InMemoryControlPlane::new(product_id_from_env())))
        }
        Err(e) => {
            tracing::error!("APIM control plane not configured: {e}");
            Err(e.into())
        }
    }
}

fn build_verifier(cli: &Cli, development: bool) -> Result<TokenVerifier, Box<dyn std::error::Error>> {
    if development {
        return Ok(TokenVerifier::development());
    }

    let audience = cli
        .azure_api_client_id
        .clone()
        .ok_or("AZURE_API_CLIENT_ID is required outside development")?;
    let jwks_url = match (&cli.jwks_url, &cli.azure_tenant_id) {
        (Some(url), _) => url.clone(),
        (None, Some(tenant)) => jwks_url_for_tenant(tenant),
        (None, None) => {
            return Err("AZURE_TENANT_ID (or AZURE_JWKS_URL) is required outside development".into())
        }
    };

    tracing::warn!("token issuer is not validated; any tenant's token with the right audience is accepted");
    tracing::info!(%jwks_url, "JWT verification enabled");

    Ok(TokenVerifier::new(AuthMode::Jwt(JwtConfig {
        jwks_url,
        audience,
        cache_ttl: Duration::from_secs(cli.jwks_cache_ttl_secs),
    })))
}
