//! Typed client for APIM subscriptions via Azure Resource Manager.
//!
//! Base: `{management_url}/subscriptions/{subscriptionId}/resourceGroups/{rg}/providers/Microsoft.ApiManagement/service/{service}`
//!
//! | Method | Path (relative to service) | Operation |
//! |--------|----------------------------|-----------|
//! | PUT    | `/subscriptions/{sid}` | Create or update |
//! | GET    | `/subscriptions` | List (paged via `nextLink`) |
//! | GET    | `/subscriptions/{sid}` | Get |
//! | DELETE | `/subscriptions/{sid}` | Delete (`If-Match: *`) |
//! | POST   | `/subscriptions/{sid}/regeneratePrimaryKey` | Regenerate primary key |
//! | POST   | `/subscriptions/{sid}/listSecrets` | Read keys |
//!
//! Recent API versions omit `primaryKey`/`secondaryKey` from GET and list
//! responses; the client falls back to `listSecrets` where a key is needed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nsm_core::SubscriptionSid;

use crate::config::ApimConfig;
use crate::credential::TokenProvider;
use crate::error::ApimError;
use crate::SubscriptionControlPlane;

// -- Types matching ARM schemas -----------------------------------------------

/// Subscription state as defined by APIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Suspended,
    Submitted,
    Rejected,
    Cancelled,
    Expired,
    /// Forward-compatible catch-all.
    #[serde(other)]
    Unknown,
}

/// APIM subscription contract as returned by ARM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionContract {
    /// Full ARM resource id.
    #[serde(default)]
    pub id: Option<String>,
    /// Subscription id (`sid`), e.g. `sub-0ed11b7c`.
    pub name: String,
    #[serde(default)]
    pub properties: SubscriptionProperties,
}

/// `properties` block of a subscription contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProperties {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<SubscriptionState>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
}

impl SubscriptionContract {
    /// The subscription id of this contract.
    pub fn sid(&self) -> SubscriptionSid {
        SubscriptionSid::from_raw(self.name.clone())
    }

    /// The primary key, if the response carried one.
    pub fn primary_key(&self) -> Option<&str> {
        self.properties.primary_key.as_deref()
    }
}

/// Keys returned by `listSecrets`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKeys {
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
}

/// Body of a create-or-update request.
#[derive(Debug, Serialize)]
pub struct CreateSubscriptionRequest {
    pub properties: CreateSubscriptionProperties,
}

/// `properties` of a create-or-update request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionProperties {
    pub scope: String,
    pub display_name: String,
    pub state: SubscriptionState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPage {
    #[serde(default)]
    value: Vec<SubscriptionContract>,
    #[serde(default)]
    next_link: Option<String>,
}

// -- Client -------------------------------------------------------------------

/// HTTP client for the APIM subscription control plane.
#[derive(Debug)]
pub struct ApimClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    config: ApimConfig,
}

impl ApimClient {
    /// Create a new client from configuration.
    pub fn new(config: ApimConfig) -> Result<Self, ApimError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApimError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            tokens: TokenProvider::new(config.credential.clone(), http.clone()),
            http,
            config,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ApimConfig {
        &self.config
    }

    fn collection_url(&self) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.management_url,
            self.config.subscriptions_path(),
            self.config.api_version
        )
    }

    fn item_url(&self, sid: &SubscriptionSid, action: Option<&str>) -> String {
        let suffix = action.map(|a| format!("/{a}")).unwrap_or_default();
        format!(
            "{}{}/{}{}?api-version={}",
            self.config.management_url,
            self.config.subscriptions_path(),
            sid,
            suffix,
            self.config.api_version
        )
    }

    /// Send a request with a fresh bearer token and map non-2xx statuses.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApimError> {
        let token = self.tokens.token().await?;
        let resp = request
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| ApimError::Http {
                endpoint: endpoint.to_string(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApimError::ApiError {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }

        Ok(resp)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<T, ApimError> {
        resp.json().await.map_err(|e| ApimError::Deserialization {
            endpoint: endpoint.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl SubscriptionControlPlane for ApimClient {
    async fn create_subscription(
        &self,
        sid: &SubscriptionSid,
        display_name: &str,
    ) -> Result<SubscriptionContract, ApimError> {
        let endpoint = format!("PUT /subscriptions/{sid}");
        let body = CreateSubscriptionRequest {
            properties: CreateSubscriptionProperties {
                scope: self.config.product_scope(),
                display_name: display_name.to_string(),
                state: SubscriptionState::Active,
            },
        };

        let resp = self
            .send(&endpoint, self.http.put(self.item_url(sid, None)).json(&body))
            .await?;
        let mut contract: SubscriptionContract = Self::read_json(&endpoint, resp).await?;

        if contract.properties.primary_key.is_none() {
            let keys = self.list_secrets(sid).await?;
            contract.properties.primary_key = keys.primary_key;
            contract.properties.secondary_key = keys.secondary_key;
        }

        tracing::info!(sid = %sid, "APIM subscription created or updated");
        Ok(contract)
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionContract>, ApimError> {
        let endpoint = "GET /subscriptions";
        let mut url = self.collection_url();
        let mut all = Vec::new();

        loop {
            let resp = self.send(endpoint, self.http.get(&url)).await?;
            let page: SubscriptionPage = Self::read_json(endpoint, resp).await?;
            all.extend(page.value);
            match page.next_link {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(all)
    }

    async fn get_subscription(
        &self,
        sid: &SubscriptionSid,
    ) -> Result<SubscriptionContract, ApimError> {
        let endpoint = format!("GET /subscriptions/{sid}");
        let resp = self
            .send(&endpoint, self.http.get(self.item_url(sid, None)))
            .await?;
        Self::read_json(&endpoint, resp).await
    }

    async fn delete_subscription(&self, sid: &SubscriptionSid) -> Result<(), ApimError> {
        let endpoint = format!("DELETE /subscriptions/{sid}");
        self.send(
            &endpoint,
            self.http
                .delete(self.item_url(sid, None))
                .header(reqwest::header::IF_MATCH, "*"),
        )
        .await?;
        tracing::info!(sid = %sid, "APIM subscription deleted");
        Ok(())
    }

    async fn regenerate_primary_key(&self, sid: &SubscriptionSid) -> Result<(), ApimError> {
        let endpoint = format!("POST /subscriptions/{sid}/regeneratePrimaryKey");
        self.send(
            &endpoint,
            self.http
                .post(self.item_url(sid, Some("regeneratePrimaryKey")))
                .body(""),
        )
        .await?;
        tracing::info!(sid = %sid, "APIM primary key regenerated");
        Ok(())
    }

    async fn list_secrets(&self, sid: &SubscriptionSid) -> Result<SubscriptionKeys, ApimError> {
        let endpoint = format!("POST /subscriptions/{sid}/listSecrets");
        let resp = self
            .send(
                &endpoint,
                self.http
                    .post(self.item_url(sid, Some("listSecrets")))
                    .body(""),
            )
            .await?;
        Self::read_json(&endpoint, resp).await
    }
}
