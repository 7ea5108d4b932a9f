//! # Customer Provisioning
//!
//! Operations that span the relational store and the subscription control
//! plane. Neither system participates in a shared transaction, so each
//! operation documents which partial states it can leave behind.
//!
//! ## Create
//!
//! ```text
//! insert Customers row ──► CustomerRecorded
//!        │                      │ create APIM subscription sub-{tenant[..8]}
//!        ▼                      ▼
//!   409 if tenant exists   SubscriptionIssued
//!                               │ insert ApiSubscriptions row
//!                               ▼
//!                          ProvisionedCustomer
//! ```
//!
//! A failure after `CustomerRecorded` leaves the customer row in place (and,
//! after `SubscriptionIssued`, a live APIM subscription with no stored key).
//! These are not compensated; the stage is logged so an operator can clean up.
//!
//! ## Delete
//!
//! Control-plane removal is best effort and reported as a [`DeleteOutcome`];
//! the store rows are always removed.
//!
//! ## Rotate
//!
//! The stored key identifies the APIM subscription. If no subscription holds
//! that key any more (drift), the rotation fails without touching the store.

use serde::Serialize;

use nsm_apim_client::{ApimError, SubscriptionControlPlane};
use nsm_core::{RequestLimits, SubscriptionSid, TenantId, Tier};

use crate::db::{AdminStore, NewSubscription};
use crate::error::AppError;

/// A validated create-customer request.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub tenant: TenantId,
    pub customer_name: String,
    pub tier: Tier,
    pub limits: RequestLimits,
}

/// Last step a create reached before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    /// Customer row inserted; no subscription yet.
    CustomerRecorded,
    /// APIM subscription exists; its key is not stored.
    SubscriptionIssued,
}

/// A fully provisioned customer.
#[derive(Debug, Clone)]
pub struct ProvisionedCustomer {
    pub tenant: TenantId,
    pub customer_name: String,
    pub sid: SubscriptionSid,
    pub api_key: String,
    pub tier: Tier,
}

/// What happened to the control-plane subscription during a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The matching APIM subscription was deleted.
    Deleted { sid: String },
    /// Store rows removed; the APIM subscription could not be found or removed.
    DeletedLocally { reason: String },
    /// The tenant had no subscription row; the control plane was not contacted.
    NoSubscription,
}

/// Record the customer, issue its APIM subscription and store the key.
pub async fn provision_customer(
    store: &dyn AdminStore,
    control_plane: &dyn SubscriptionControlPlane,
    customer: NewCustomer,
) -> Result<ProvisionedCustomer, AppError> {
    store
        .insert_customer(&customer.tenant, &customer.customer_name)
        .await?;
    tracing::info!(tenant = %customer.tenant, "customer recorded");

    let sid = SubscriptionSid::for_tenant(&customer.tenant);
    let contract = control_plane
        .create_subscription(&sid, &customer.customer_name)
        .await
        .map_err(|e| abandoned(ProvisioningStage::CustomerRecorded, &customer.tenant, e.into()))?;
    let api_key = contract.properties.primary_key.ok_or_else(|| {
        abandoned(
            ProvisioningStage::SubscriptionIssued,
            &customer.tenant,
            ApimError::MissingKey {
                sid: sid.to_string(),
            }
            .into(),
        )
    })?;

    store
        .insert_subscription(&NewSubscription {
            tenant: customer.tenant.clone(),
            subscription_name: customer.customer_name.clone(),
            subscription_key: api_key.clone(),
            tier: customer.tier.clone(),
            limits: customer.limits,
        })
        .await
        .map_err(|e| abandoned(ProvisioningStage::SubscriptionIssued, &customer.tenant, e.into()))?;

    tracing::info!(tenant = %customer.tenant, sid = %sid, "customer provisioned");
    Ok(ProvisionedCustomer {
        tenant: customer.tenant,
        customer_name: customer.customer_name,
        sid,
        api_key,
        tier: customer.tier,
    })
}

fn abandoned(stage: ProvisioningStage, tenant: &TenantId, err: AppError) -> AppError {
    tracing::error!(
        tenant = %tenant,
        stage = ?stage,
        error = %err,
        "customer provisioning stopped part-way; partial state left in place"
    );
    err
}

/// Remove a customer's APIM subscription (best effort) and its store rows.
///
/// Deleting an unknown tenant succeeds with [`DeleteOutcome::NoSubscription`].
pub async fn delete_customer(
    store: &dyn AdminStore,
    control_plane: &dyn SubscriptionControlPlane,
    tenant: &str,
) -> Result<DeleteOutcome, AppError> {
    let outcome = match store.subscription_key(tenant).await? {
        None => DeleteOutcome::NoSubscription,
        Some(key) => remove_subscription_by_key(control_plane, tenant, &key).await,
    };

    let removed = store.delete_customer(tenant).await?;
    tracing::info!(
        tenant,
        subscriptions = removed.subscriptions,
        customers = removed.customers,
        control_plane = ?outcome,
        "customer deleted"
    );
    Ok(outcome)
}

async fn remove_subscription_by_key(
    control_plane: &dyn SubscriptionControlPlane,
    tenant: &str,
    key: &str,
) -> DeleteOutcome {
    let contract = match control_plane.find_by_primary_key(key).await {
        Ok(Some(contract)) => contract,
        Ok(None) => {
            tracing::warn!(tenant, "no APIM subscription holds the stored key");
            return DeleteOutcome::DeletedLocally {
                reason: "no APIM subscription matches the stored key".into(),
            };
        }
        Err(e) => return swallowed(tenant, e),
    };

    let sid = contract.sid();
    match control_plane.delete_subscription(&sid).await {
        Ok(()) => DeleteOutcome::Deleted {
            sid: sid.to_string(),
        },
        Err(e) => swallowed(tenant, e),
    }
}

fn swallowed(tenant: &str, err: ApimError) -> DeleteOutcome {
    tracing::warn!(tenant, error = %err, "failed to delete APIM subscription");
    DeleteOutcome::DeletedLocally {
        reason: err.to_string(),
    }
}

/// Regenerate the primary key of a tenant's APIM subscription and store it.
pub async fn rotate_key(
    store: &dyn AdminStore,
    control_plane: &dyn SubscriptionControlPlane,
    tenant: &str,
) -> Result<String, AppError> {
    let old_key = store
        .subscription_key(tenant)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer not found".into()))?;

    let contract = control_plane
        .find_by_primary_key(&old_key)
        .await?
        .ok_or_else(|| {
            tracing::error!(tenant, "stored key matches no APIM subscription");
            AppError::Internal("Failed to regenerate key in APIM".into())
        })?;
    let sid = contract.sid();

    control_plane.regenerate_primary_key(&sid).await?;
    let new_key = control_plane.current_primary_key(&sid).await?;

    if !store.update_subscription_key(tenant, &new_key).await? {
        tracing::warn!(tenant, sid = %sid, "subscription row vanished during key rotation");
    }
    tracing::info!(tenant, sid = %sid, "API key rotated");
    Ok(new_key)
}
