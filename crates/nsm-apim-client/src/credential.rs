//! ARM access token acquisition.
//!
//! A static token is used as-is. The client-credentials grant is cached until
//! shortly before expiry; concurrent callers share one refresh.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::config::ArmCredential;
use crate::error::ApimError;

const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are refreshed this long before the authority's stated expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: Zeroizing<String>,
    refresh_at: Instant,
}

/// Supplies bearer tokens for ARM requests.
pub(crate) struct TokenProvider {
    credential: ArmCredential,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    pub(crate) fn new(credential: ArmCredential, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            cache: Mutex::new(None),
        }
    }

    /// Return a valid access token, acquiring one if the cache is empty or stale.
    pub(crate) async fn token(&self) -> Result<Zeroizing<String>, ApimError> {
        let (tenant_id, client_id, client_secret, authority_url) = match &self.credential {
            ArmCredential::StaticToken(token) => return Ok(token.clone()),
            ArmCredential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                authority_url,
            } => (tenant_id, client_id, client_secret, authority_url),
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_url.as_str().trim_end_matches('/'),
            tenant_id
        );
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret.as_str())
            .append_pair("scope", ARM_SCOPE)
            .finish();

        let resp = self
            .http
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| ApimError::Credential(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ApimError::Credential(format!(
                "token endpoint returned {status}: {detail}"
            )));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ApimError::Credential(e.to_string()))?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(300));
        let token = Zeroizing::new(parsed.access_token);
        *cache = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        });
        tracing::debug!(
            expires_in_secs = lifetime.as_secs(),
            "acquired ARM access token"
        );

        Ok(token)
    }
}
