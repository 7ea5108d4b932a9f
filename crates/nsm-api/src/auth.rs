//! # Authentication Middleware
//!
//! Bearer-token verification against the identity provider's signing keys.
//!
//! ## Modes
//!
//! - [`AuthMode::Development`]: every request is allowed without a token.
//! - [`AuthMode::Jwt`]: the `Authorization: Bearer <jwt>` header must carry
//!   an RS256 token signed by a key in the provider's JWKS, unexpired, with
//!   `aud` equal to the configured API client id. The issuer is **not**
//!   checked.
//!
//! ## Outcome
//!
//! [`TokenVerifier::verify_header`] never fails; it returns an
//! [`AuthDecision`]. The middleware turns a denial into
//! `401 {"error":"Unauthorized"}` before any handler or body parsing runs,
//! and inserts the [`Principal`] into request extensions on success.
//!
//! ## Key cache
//!
//! The JWKS is cached for `cache_ttl` and refetched when a token names a
//! `kid` the cached set does not contain, so signing-key rotation is picked
//! up without a restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ErrorBody;

/// Default JWKS cache lifetime.
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Clock skew tolerated on `exp`/`nbf`. None: a token is rejected once `exp` passes.
const LEEWAY_SECS: u64 = 0;

/// JWKS URL for an Entra ID tenant.
pub fn jwks_url_for_tenant(tenant_id: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant_id}/discovery/v2.0/keys")
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Settings for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Where the signing keys are published.
    pub jwks_url: String,
    /// Expected `aud` claim (the API's client id).
    pub audience: String,
    /// How long a fetched key set is trusted.
    pub cache_ttl: Duration,
}

/// How requests are authenticated.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Every request is allowed.
    Development,
    /// Bearer JWT verified against a JWKS.
    Jwt(JwtConfig),
}

// ── Decision types ──────────────────────────────────────────────────────────

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Principal {
    /// `preferred_username` claim, when present.
    pub username: Option<String>,
    /// `sub` claim, when present.
    pub subject: Option<String>,
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header is not a Bearer token")]
    NotBearer,
    #[error("token is malformed")]
    Malformed,
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("no signing key with id {0}")]
    UnknownKey(String),
    #[error("signing keys unavailable: {0}")]
    JwksUnavailable(String),
    #[error("token has expired")]
    Expired,
    #[error("token audience does not match")]
    InvalidAudience,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Outcome of verifying a request's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed(Principal),
    Denied(DenyReason),
}

// ── Verifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedJwks {
    set: Arc<JwkSet>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Verifies bearer tokens for the auth middleware.
#[derive(Debug)]
pub struct TokenVerifier {
    mode: AuthMode,
    jwks_cache: RwLock<Option<CachedJwks>>,
    http: reqwest::Client,
}

impl TokenVerifier {
    pub fn new(mode: AuthMode) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(error = %err, "failed to configure JWKS HTTP client; using defaults");
                reqwest::Client::new()
            }
        };

        Self {
            mode,
            jwks_cache: RwLock::new(None),
            http,
        }
    }

    /// Convenience constructor for development mode.
    pub fn development() -> Self {
        Self::new(AuthMode::Development)
    }

    /// Verify the raw `Authorization` header value.
    pub async fn verify_header(&self, header_value: Option<&str>) -> AuthDecision {
        let config = match &self.mode {
            AuthMode::Development => return AuthDecision::Allowed(Principal::default()),
            AuthMode::Jwt(config) => config,
        };

        let Some(value) = header_value else {
            return AuthDecision::Denied(DenyReason::MissingHeader);
        };
        let Some(token) = value.strip_prefix("Bearer ") else {
            return AuthDecision::Denied(DenyReason::NotBearer);
        };

        match self.verify_token(config, token.trim()).await {
            Ok(principal) => AuthDecision::Allowed(principal),
            Err(reason) => AuthDecision::Denied(reason),
        }
    }

    async fn verify_token(&self, config: &JwtConfig, token: &str) -> Result<Principal, DenyReason> {
        let header = decode_header(token).map_err(|_| DenyReason::Malformed)?;
        let kid = header.kid.ok_or(DenyReason::MissingKeyId)?;

        let jwk = self
            .get_jwk(config, &kid)
            .await?
            .ok_or_else(|| DenyReason::UnknownKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| DenyReason::Rejected(e.to_string()))?;

        let claims = decode::<Value>(token, &key, &validation_for(config))
            .map(|t| t.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => DenyReason::Expired,
                ErrorKind::InvalidAudience => DenyReason::InvalidAudience,
                ErrorKind::InvalidSignature => DenyReason::InvalidSignature,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    DenyReason::Malformed
                }
                other => DenyReason::Rejected(format!("{other:?}")),
            })?;

        let claim = |name: &str| claims.get(name).and_then(Value::as_str).map(String::from);
        Ok(Principal {
            username: claim("preferred_username"),
            subject: claim("sub"),
        })
    }

    async fn get_jwk(&self, config: &JwtConfig, kid: &str) -> Result<Option<Jwk>, DenyReason> {
        if let Some(jwk) = self.cached_jwk(kid, config.cache_ttl).await {
            return Ok(Some(jwk));
        }

        self.refresh_jwks(&config.jwks_url).await?;
        Ok(self.cached_jwk(kid, config.cache_ttl).await)
    }

    async fn cached_jwk(&self, kid: &str, ttl: Duration) -> Option<Jwk> {
        let cache = self.jwks_cache.read().await;
        let set = match cache.as_ref() {
            Some(cached) if cached.is_fresh(ttl) => Arc::clone(&cached.set),
            _ => return None,
        };
        drop(cache);

        set.find(kid).cloned()
    }

    async fn refresh_jwks(&self, url: &str) -> Result<(), DenyReason> {
        let unavailable = |e: reqwest::Error| {
            tracing::warn!(error = %e, "failed to fetch JWKS");
            DenyReason::JwksUnavailable(e.to_string())
        };

        let set = self
            .http
            .get(url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json::<JwkSet>()
            .await
            .map_err(unavailable)?;

        tracing::debug!(keys = set.keys.len(), "refreshed JWKS");
        *self.jwks_cache.write().await = Some(CachedJwks {
            set: Arc::new(set),
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

/// RS256 only, `exp` and `aud` required, issuer unchecked, no expiry leeway.
fn validation_for(config: &JwtConfig) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = LEEWAY_SECS;
    validation.set_audience(&[config.audience.as_str()]);
    validation.set_required_spec_claims(&["exp", "aud"]);
    validation
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Gate a request on the [`TokenVerifier`] in request extensions.
///
/// Fails closed: a router assembled without a verifier denies everything.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(verifier) = request.extensions().get::<Arc<TokenVerifier>>().cloned() else {
        tracing::error!("auth middleware installed without a TokenVerifier");
        return unauthorized_response();
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match verifier.verify_header(header_value).await {
        AuthDecision::Allowed(principal) => {
            tracing::debug!(
                user = principal.username.as_deref().unwrap_or("unknown"),
                "authenticated request"
            );
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        AuthDecision::Denied(reason) => {
            tracing::warn!(%reason, path = %request.uri().path(), "authentication failed");
            unauthorized_response()
        }
    }
}

fn unauthorized_response() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("Unauthorized"))).into_response()
}
