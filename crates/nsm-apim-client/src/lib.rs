//! # nsm-apim-client -- Typed client for the APIM subscription control plane
//!
//! Issues, looks up, rotates and deletes the gateway subscriptions that back
//! each customer's API key. The production implementation ([`ApimClient`])
//! speaks the Azure Resource Manager REST API; [`stub::InMemoryControlPlane`]
//! serves development mode and tests.
//!
//! ## Architecture
//!
//! [`SubscriptionControlPlane`] is the seam the API service depends on. It is
//! object-safe so the service holds an `Arc<dyn SubscriptionControlPlane>`
//! and never knows which backend it talks to.
//!
//! ## Failure Policy
//!
//! Calls are made once. There is no retry or backoff: the caller decides
//! whether a failure is fatal (create, rotate) or best-effort (delete).

pub mod config;
pub(crate) mod credential;
pub mod error;
pub mod stub;
pub mod subscriptions;

pub use config::{product_id_from_env, ApimConfig, ArmCredential, ConfigError};
pub use error::ApimError;
pub use subscriptions::{ApimClient, SubscriptionContract, SubscriptionKeys, SubscriptionState};

use async_trait::async_trait;
use nsm_core::SubscriptionSid;

/// Operations the admin API consumes from the subscription control plane.
#[async_trait]
pub trait SubscriptionControlPlane: Send + Sync + std::fmt::Debug {
    /// Create (or overwrite) subscription `sid`, active, scoped to the
    /// configured product. The returned contract always carries the primary key.
    async fn create_subscription(
        &self,
        sid: &SubscriptionSid,
        display_name: &str,
    ) -> Result<SubscriptionContract, ApimError>;

    /// List every subscription on the service.
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionContract>, ApimError>;

    /// Fetch one subscription.
    async fn get_subscription(&self, sid: &SubscriptionSid)
        -> Result<SubscriptionContract, ApimError>;

    /// Delete one subscription.
    async fn delete_subscription(&self, sid: &SubscriptionSid) -> Result<(), ApimError>;

    /// Replace the primary key with a freshly generated one.
    async fn regenerate_primary_key(&self, sid: &SubscriptionSid) -> Result<(), ApimError>;

    /// Read the subscription's keys.
    async fn list_secrets(&self, sid: &SubscriptionSid) -> Result<SubscriptionKeys, ApimError>;

    /// Read the current primary key of `sid`, falling back to `listSecrets`
    /// when the contract omits it.
    async fn current_primary_key(&self, sid: &SubscriptionSid) -> Result<String, ApimError> {
        let contract = self.get_subscription(sid).await?;
        if let Some(key) = contract.properties.primary_key {
            return Ok(key);
        }
        self.list_secrets(sid)
            .await?
            .primary_key
            .ok_or_else(|| ApimError::MissingKey {
                sid: sid.to_string(),
            })
    }

    /// Find the subscription whose primary key equals `key`.
    ///
    /// Subscriptions listed without keys are resolved through `listSecrets`
    /// one at a time until a match is found.
    async fn find_by_primary_key(
        &self,
        key: &str,
    ) -> Result<Option<SubscriptionContract>, ApimError> {
        let subscriptions = self.list_subscriptions().await?;
        for mut contract in subscriptions {
            let primary = match contract.properties.primary_key.take() {
                Some(pk) => Some(pk),
                None => self.list_secrets(&contract.sid()).await?.primary_key,
            };
            if primary.as_deref() == Some(key) {
                contract.properties.primary_key = primary;
                return Ok(Some(contract));
            }
        }
        Ok(None)
    }
}
