//! In-memory control plane for development mode and tests.
//!
//! Keeps subscriptions in a `parking_lot::RwLock<BTreeMap>`; the lock is never
//! held across an `.await`. The most recent calls are recorded so tests can
//! assert which operations reached the control plane, and individual
//! operations can be forced to fail.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use nsm_core::SubscriptionSid;

use crate::error::ApimError;
use crate::subscriptions::{
    SubscriptionContract, SubscriptionKeys, SubscriptionProperties, SubscriptionState,
};
use crate::SubscriptionControlPlane;

/// Control-plane operation names, used for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    List,
    Get,
    Delete,
    RegenerateKey,
    ListSecrets,
}

/// Calls kept by the recorder; older entries are dropped first.
pub const CALL_LOG_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct InMemoryControlPlane {
    product_id: String,
    subscriptions: RwLock<BTreeMap<String, SubscriptionContract>>,
    calls: Mutex<VecDeque<Operation>>,
    failing: RwLock<HashSet<Operation>>,
    key_counter: AtomicU64,
}

impl InMemoryControlPlane {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            subscriptions: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(VecDeque::new()),
            failing: RwLock::new(HashSet::new()),
            key_counter: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call of `op` fail with a 503.
    pub fn fail(&self, op: Operation) {
        self.failing.write().insert(op);
    }

    /// Undo [`fail`](Self::fail).
    pub fn heal(&self, op: Operation) {
        self.failing.write().remove(&op);
    }

    /// The last [`CALL_LOG_CAPACITY`] operations received, oldest first.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().iter().copied().collect()
    }

    /// Number of subscriptions currently held.
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Current primary key of `sid`, bypassing call recording.
    pub fn primary_key_of(&self, sid: &str) -> Option<String> {
        self.subscriptions
            .read()
            .get(sid)
            .and_then(|c| c.properties.primary_key.clone())
    }

    /// Insert a subscription directly, e.g. to simulate keys issued elsewhere.
    pub fn seed(&self, sid: &str, display_name: &str, primary_key: &str) {
        let contract = self.contract(sid, display_name, primary_key.to_string());
        self.subscriptions.write().insert(sid.to_string(), contract);
    }

    fn enter(&self, op: Operation) -> Result<(), ApimError> {
        {
            let mut calls = self.calls.lock();
            if calls.len() == CALL_LOG_CAPACITY {
                calls.pop_front();
            }
            calls.push_back(op);
        }
        if self.failing.read().contains(&op) {
            return Err(ApimError::ApiError {
                endpoint: format!("{op:?}"),
                status: 503,
                body: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn next_key(&self) -> String {
        let n = self.key_counter.fetch_add(1, Ordering::Relaxed);
        format!("{:016x}{:016x}", Utc::now().timestamp_nanos_opt().unwrap_or(0), n)
    }

    fn contract(&self, sid: &str, display_name: &str, primary_key: String) -> SubscriptionContract {
        SubscriptionContract {
            id: Some(format!("/subscriptions/{sid}")),
            name: sid.to_string(),
            properties: SubscriptionProperties {
                display_name: Some(display_name.to_string()),
                scope: Some(format!("/products/{}", self.product_id)),
                state: Some(SubscriptionState::Active),
                created_date: Some(Utc::now()),
                primary_key: Some(primary_key),
                secondary_key: Some(self.next_key()),
            },
        }
    }

    fn not_found(sid: &SubscriptionSid) -> ApimError {
        ApimError::ApiError {
            endpoint: format!("/subscriptions/{sid}"),
            status: 404,
            body: "subscription not found".into(),
        }
    }
}

#[async_trait]
impl SubscriptionControlPlane for InMemoryControlPlane {
    async fn create_subscription(
        &self,
        sid: &SubscriptionSid,
        display_name: &str,
    ) -> Result<SubscriptionContract, ApimError> {
        self.enter(Operation::Create)?;
        let contract = self.contract(sid.as_str(), display_name, self.next_key());
        self.subscriptions
            .write()
            .insert(sid.to_string(), contract.clone());
        Ok(contract)
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionContract>, ApimError> {
        self.enter(Operation::List)?;
        Ok(self.subscriptions.read().values().cloned().collect())
    }

    async fn get_subscription(
        &self,
        sid: &SubscriptionSid,
    ) -> Result<SubscriptionContract, ApimError> {
        self.enter(Operation::Get)?;
        self.subscriptions
            .read()
            .get(sid.as_str())
            .cloned()
            .ok_or_else(|| Self::not_found(sid))
    }

    async fn delete_subscription(&self, sid: &SubscriptionSid) -> Result<(), ApimError> {
        self.enter(Operation::Delete)?;
        self.subscriptions
            .write()
            .remove(sid.as_str())
            .map(|_| ())
            .ok_or_else(|| Self::not_found(sid))
    }

    async fn regenerate_primary_key(&self, sid: &SubscriptionSid) -> Result<(), ApimError> {
        self.enter(Operation::RegenerateKey)?;
        let fresh = self.next_key();
        let mut subs = self.subscriptions.write();
        let contract = subs.get_mut(sid.as_str()).ok_or_else(|| Self::not_found(sid))?;
        contract.properties.primary_key = Some(fresh);
        Ok(())
    }

    async fn list_secrets(&self, sid: &SubscriptionSid) -> Result<SubscriptionKeys, ApimError> {
        self.enter(Operation::ListSecrets)?;
        let subs = self.subscriptions.read();
        let contract = subs.get(sid.as_str()).ok_or_else(|| Self::not_found(sid))?;
        Ok(SubscriptionKeys {
            primary_key: contract.properties.primary_key.clone(),
            secondary_key: contract.properties.secondary_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_find_by_key() {
        let cp = InMemoryControlPlane::new("monitoring-standard");
        let sid = SubscriptionSid::from_raw("sub-T1");
        let created = cp.create_subscription(&sid, "Acme").await.unwrap();
        let key = created.primary_key().unwrap().to_string();

        let found = cp.find_by_primary_key(&key).await.unwrap().unwrap();
        assert_eq!(found.name, "sub-T1");
        assert_eq!(
            found.properties.scope.as_deref(),
            Some("/products/monitoring-standard")
        );
    }

    #[tokio::test]
    async fn regenerate_changes_key() {
        let cp = InMemoryControlPlane::new("p");
        let sid = SubscriptionSid::from_raw("sub-T1");
        let before = cp
            .create_subscription(&sid, "Acme")
            .await
            .unwrap()
            .properties
            .primary_key
            .unwrap();
        cp.regenerate_primary_key(&sid).await.unwrap();
        let after = cp.current_primary_key(&sid).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn injected_failure_is_recorded() {
        let cp = InMemoryControlPlane::new("p");
        cp.fail(Operation::List);
        assert!(cp.list_subscriptions().await.is_err());
        assert_eq!(cp.calls(), vec![Operation::List]);
        cp.heal(Operation::List);
        assert!(cp.list_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let cp = InMemoryControlPlane::new("p");
        let err = cp
            .delete_subscription(&SubscriptionSid::from_raw("sub-x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn call_log_keeps_only_latest_calls() {
        let cp = InMemoryControlPlane::new("p");
        for _ in 0..CALL_LOG_CAPACITY {
            cp.list_subscriptions().await.unwrap();
        }
        cp.get_subscription(&SubscriptionSid::from_raw("sub-x"))
            .await
            .unwrap_err();

        let calls = cp.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert_eq!(calls.last(), Some(&Operation::Get));
        assert_eq!(calls[0], Operation::List);
    }
}
