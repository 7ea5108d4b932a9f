//! API Management client configuration.
//!
//! Identifies the APIM instance (Azure subscription, resource group, service
//! name), the product new subscriptions are scoped to, and how to obtain an
//! ARM access token. Defaults match the production deployment.

use url::Url;
use zeroize::Zeroizing;

/// ARM API version used for every subscription call.
pub const DEFAULT_API_VERSION: &str = "2022-08-01";

const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_RESOURCE_GROUP: &str = "rg-apimgmt-numberskills";
const DEFAULT_SERVICE_NAME: &str = "numberskills";
const DEFAULT_PRODUCT_ID: &str = "monitoring-standard";

/// How the client authenticates to Azure Resource Manager.
#[derive(Clone)]
pub enum ArmCredential {
    /// A pre-acquired bearer token (e.g. from `az account get-access-token`).
    StaticToken(Zeroizing<String>),
    /// OAuth2 client-credentials grant against the identity authority.
    ClientSecret {
        /// Directory (tenant) the service principal lives in.
        tenant_id: String,
        /// Application (client) id of the service principal.
        client_id: String,
        /// Client secret.
        client_secret: Zeroizing<String>,
        /// Authority base, e.g. `https://login.microsoftonline.com`.
        authority_url: Url,
    },
}

impl std::fmt::Debug for ArmCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticToken(_) => f.debug_tuple("StaticToken").field(&"[REDACTED]").finish(),
            Self::ClientSecret {
                tenant_id,
                client_id,
                authority_url,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("authority_url", authority_url)
                .finish(),
        }
    }
}

/// Configuration for the APIM subscription control plane.
#[derive(Debug, Clone)]
pub struct ApimConfig {
    /// ARM endpoint. Default: <https://management.azure.com>
    pub management_url: Url,
    /// Azure subscription that owns the APIM instance.
    pub subscription_id: String,
    /// Resource group of the APIM instance.
    pub resource_group: String,
    /// APIM service name.
    pub service_name: String,
    /// Product every customer subscription is scoped to.
    pub product_id: String,
    /// ARM `api-version` query parameter.
    pub api_version: String,
    /// ARM credential.
    pub credential: ArmCredential,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApimConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `APIM_SUBSCRIPTION_ID` (required)
    /// - `APIM_RESOURCE_GROUP` (default: `rg-apimgmt-numberskills`)
    /// - `APIM_SERVICE_NAME` (default: `numberskills`)
    /// - `APIM_PRODUCT_ID` (default: `monitoring-standard`)
    /// - `APIM_MANAGEMENT_URL` (default: `https://management.azure.com`)
    /// - `APIM_API_VERSION` (default: `2022-08-01`)
    /// - `APIM_TIMEOUT_SECS` (default: 30)
    /// - `APIM_ACCESS_TOKEN`, or `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` +
    ///   `AZURE_CLIENT_SECRET` (+ optional `AZURE_AUTHORITY_HOST`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let subscription_id = std::env::var("APIM_SUBSCRIPTION_ID")
            .map_err(|_| ConfigError::Missing("APIM_SUBSCRIPTION_ID"))?;

        Ok(Self {
            management_url: env_url("APIM_MANAGEMENT_URL", DEFAULT_MANAGEMENT_URL)?,
            subscription_id,
            resource_group: env_or("APIM_RESOURCE_GROUP", DEFAULT_RESOURCE_GROUP),
            service_name: env_or("APIM_SERVICE_NAME", DEFAULT_SERVICE_NAME),
            product_id: product_id_from_env(),
            api_version: env_or("APIM_API_VERSION", DEFAULT_API_VERSION),
            credential: credential_from_env()?,
            timeout_secs: std::env::var("APIM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Configuration pointing at a local mock ARM server with a static token.
    pub fn local_mock(base_url: &str, token: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            management_url: Url::parse(base_url)
                .map_err(|e| ConfigError::InvalidUrl("management_url".into(), e.to_string()))?,
            subscription_id: "00000000-0000-0000-0000-000000000000".into(),
            resource_group: DEFAULT_RESOURCE_GROUP.into(),
            service_name: DEFAULT_SERVICE_NAME.into(),
            product_id: DEFAULT_PRODUCT_ID.into(),
            api_version: DEFAULT_API_VERSION.into(),
            credential: ArmCredential::StaticToken(Zeroizing::new(token.to_string())),
            timeout_secs: 5,
        })
    }

    /// Scope string for new subscriptions, `/products/{product_id}`.
    pub fn product_scope(&self) -> String {
        format!("/products/{}", self.product_id)
    }

    /// ARM path of the APIM service's subscription collection (no leading slash).
    pub(crate) fn subscriptions_path(&self) -> String {
        format!(
            "subscriptions/{}/resourceGroups/{}/providers/Microsoft.ApiManagement/service/{}/subscriptions",
            self.subscription_id, self.resource_group, self.service_name
        )
    }
}

/// Product id from `APIM_PRODUCT_ID`, defaulting to `monitoring-standard`.
///
/// Shared by [`ApimConfig::from_env`] and callers that stand up a control
/// plane without a full ARM configuration.
pub fn product_id_from_env() -> String {
    product_id_or_default(std::env::var("APIM_PRODUCT_ID").ok())
}

fn product_id_or_default(raw: Option<String>) -> String {
    match raw {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => DEFAULT_PRODUCT_ID.to_string(),
    }
}

fn credential_from_env() -> Result<ArmCredential, ConfigError> {
    if let Ok(token) = std::env::var("APIM_ACCESS_TOKEN") {
        return Ok(ArmCredential::StaticToken(Zeroizing::new(token)));
    }

    match (
        std::env::var("AZURE_TENANT_ID"),
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
    ) {
        (Ok(tenant_id), Ok(client_id), Ok(client_secret)) => Ok(ArmCredential::ClientSecret {
            tenant_id,
            client_id,
            client_secret: Zeroizing::new(client_secret),
            authority_url: env_url("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_URL)?,
        }),
        _ => Err(ConfigError::MissingCredential),
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("no ARM credential: set APIM_ACCESS_TOKEN or AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET")]
    MissingCredential,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
