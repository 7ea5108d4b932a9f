//! In-memory [`AdminStore`] for development mode and handler tests.
//!
//! Mirrors the SQL semantics of [`PgStore`](super::postgres::PgStore):
//! inner joins drop usage/events whose tenant has no customer row, usage is
//! windowed by calendar date and events by instant. The lock is
//! `parking_lot` and is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;

use nsm_core::{ActivityKind, LookbackDays, TenantId, EXECUTION_FAILED_EVENT, FAILED_STATUS};

use super::models::{
    percent_2dp, ActivityEntry, CustomerSummary, DashboardStats, FailureGroup, NewSubscription,
    RemovedRows, SlaMetric, UsageByCustomer,
};
use super::{
    AdminStore, StoreError, API_CALLS_WINDOW_DAYS, CUSTOMER_USAGE_WINDOW_DAYS,
    RECENT_FAILURES_WINDOW_DAYS,
};

#[derive(Debug, Clone)]
struct SubscriptionRow {
    subscription_key: String,
    tier: String,
    is_active: bool,
    requests_per_hour: i32,
    requests_per_day: i32,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct UsageRow {
    customer_id: String,
    date_key: NaiveDate,
    response_time_ms: Option<i32>,
    status_code: i32,
}

/// A `MonitoringEvents` row, as written by the monitoring agents.
#[derive(Debug, Clone)]
pub struct MonitoringEvent {
    pub customer_id: String,
    pub notebook_name: String,
    pub status: String,
    pub event_type: String,
    pub event_timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    /// tenant_id -> customer_name
    customers: BTreeMap<String, String>,
    /// customer_id -> subscription
    subscriptions: HashMap<String, SubscriptionRow>,
    usage: Vec<UsageRow>,
    events: Vec<MonitoringEvent>,
}

impl Tables {
    fn customer_name(&self, tenant: &str) -> Option<&str> {
        self.customers.get(tenant).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `ApiUsageLog` row.
    pub fn record_usage(
        &self,
        tenant: &str,
        date_key: NaiveDate,
        response_time_ms: Option<i32>,
        status_code: i32,
    ) {
        self.tables.write().usage.push(UsageRow {
            customer_id: tenant.to_string(),
            date_key,
            response_time_ms,
            status_code,
        });
    }

    /// Append a `MonitoringEvents` row.
    pub fn record_event(&self, event: MonitoringEvent) {
        self.tables.write().events.push(event);
    }

    /// Overwrite the activity flags of a tenant's subscription.
    /// Returns `false` if the tenant has no subscription row.
    pub fn set_subscription_state(
        &self,
        tenant: &str,
        is_active: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        match self.tables.write().subscriptions.get_mut(tenant) {
            Some(sub) => {
                sub.is_active = is_active;
                sub.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Whether a customer row exists for `tenant`.
    pub fn has_customer(&self, tenant: &str) -> bool {
        self.tables.read().customers.contains_key(tenant)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn date_floor(days: i32) -> NaiveDate {
    today() - Duration::days(i64::from(days))
}

fn instant_floor(days: i32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(days))
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        let now = Utc::now();
        let calls_floor = date_floor(API_CALLS_WINDOW_DAYS);
        let failures_floor = instant_floor(RECENT_FAILURES_WINDOW_DAYS);
        let t = self.tables.read();

        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(DashboardStats {
            total_customers: count(t.customers.len()),
            active_subscriptions: count(
                t.subscriptions
                    .values()
                    .filter(|s| s.is_active && s.expires_at.map_or(true, |exp| exp > now))
                    .count(),
            ),
            total_api_calls: count(t.usage.iter().filter(|u| u.date_key >= calls_floor).count()),
            recent_failures: count(
                t.events
                    .iter()
                    .filter(|e| {
                        e.event_type == EXECUTION_FAILED_EVENT && e.event_timestamp >= failures_floor
                    })
                    .count(),
            ),
        })
    }

    async fn recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, StoreError> {
        let t = self.tables.read();
        let mut entries: Vec<ActivityEntry> = t
            .events
            .iter()
            .filter_map(|e| {
                let customer_name = t.customer_name(&e.customer_id)?;
                Some(ActivityEntry {
                    customer_name: customer_name.to_string(),
                    notebook_name: e.notebook_name.clone(),
                    status: e.status.clone(),
                    kind: ActivityKind::from_status(&e.status),
                    timestamp: e.event_timestamp,
                })
            })
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(entries)
    }

    async fn list_customers(&self) -> Result<Vec<CustomerSummary>, StoreError> {
        let floor = date_floor(CUSTOMER_USAGE_WINDOW_DAYS);
        let t = self.tables.read();

        let mut customers: Vec<CustomerSummary> = t
            .customers
            .iter()
            .map(|(tenant, name)| {
                let sub = t.subscriptions.get(tenant);
                let usage = t
                    .usage
                    .iter()
                    .filter(|u| &u.customer_id == tenant && u.date_key >= floor)
                    .count();
                CustomerSummary {
                    customer_name: name.clone(),
                    tenant_id: tenant.clone(),
                    subscription_key: sub.map(|s| s.subscription_key.clone()),
                    tier: sub.map(|s| s.tier.clone()),
                    is_active: sub.map_or(false, |s| s.is_active),
                    requests_per_hour: sub.map(|s| s.requests_per_hour),
                    requests_per_day: sub.map(|s| s.requests_per_day),
                    usage_30d: i64::try_from(usage).unwrap_or(i64::MAX),
                }
            })
            .collect();

        customers.sort_by(|a, b| a.customer_name.cmp(&b.customer_name));
        Ok(customers)
    }

    async fn insert_customer(
        &self,
        tenant: &TenantId,
        customer_name: &str,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.customers.contains_key(tenant.as_str()) {
            return Err(StoreError::Duplicate(tenant.to_string()));
        }
        t.customers
            .insert(tenant.to_string(), customer_name.to_string());
        Ok(())
    }

    async fn insert_subscription(&self, subscription: &NewSubscription) -> Result<(), StoreError> {
        self.tables.write().subscriptions.insert(
            subscription.tenant.to_string(),
            SubscriptionRow {
                subscription_key: subscription.subscription_key.clone(),
                tier: subscription.tier.as_str().to_string(),
                is_active: true,
                requests_per_hour: subscription.limits.per_hour,
                requests_per_day: subscription.limits.per_day,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn subscription_key(&self, tenant: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .read()
            .subscriptions
            .get(tenant)
            .map(|s| s.subscription_key.clone()))
    }

    async fn update_subscription_key(&self, tenant: &str, key: &str) -> Result<bool, StoreError> {
        match self.tables.write().subscriptions.get_mut(tenant) {
            Some(sub) => {
                sub.subscription_key = key.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_customer(&self, tenant: &str) -> Result<RemovedRows, StoreError> {
        let mut t = self.tables.write();
        Ok(RemovedRows {
            subscriptions: u64::from(t.subscriptions.remove(tenant).is_some()),
            customers: u64::from(t.customers.remove(tenant).is_some()),
        })
    }

    async fn usage_by_customer(
        &self,
        window: LookbackDays,
    ) -> Result<Vec<UsageByCustomer>, StoreError> {
        #[derive(Default)]
        struct Acc {
            total: i64,
            errors: i64,
            latency_sum: i64,
            latency_n: i64,
        }

        let floor = date_floor(window.days());
        let t = self.tables.read();
        let mut groups: BTreeMap<String, Acc> = BTreeMap::new();

        for u in t.usage.iter().filter(|u| u.date_key >= floor) {
            let Some(name) = t.customer_name(&u.customer_id) else {
                continue;
            };
            let acc = groups.entry(name.to_string()).or_default();
            acc.total += 1;
            if u.status_code >= 400 {
                acc.errors += 1;
            }
            if let Some(ms) = u.response_time_ms {
                acc.latency_sum += i64::from(ms);
                acc.latency_n += 1;
            }
        }

        let mut rows: Vec<UsageByCustomer> = groups
            .into_iter()
            .map(|(customer_name, acc)| UsageByCustomer {
                customer_name,
                total_requests: acc.total,
                avg_response_time_ms: if acc.latency_n == 0 {
                    0
                } else {
                    (acc.latency_sum as f64 / acc.latency_n as f64).round() as i64
                },
                error_rate: percent_2dp(acc.errors, acc.total),
            })
            .collect();

        rows.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
        Ok(rows)
    }

    async fn sla_metrics(&self, window: LookbackDays) -> Result<Vec<SlaMetric>, StoreError> {
        let floor = instant_floor(window.days());
        let t = self.tables.read();
        let mut groups: BTreeMap<String, (i64, i64)> = BTreeMap::new();

        for e in t.events.iter().filter(|e| e.event_timestamp >= floor) {
            let Some(name) = t.customer_name(&e.customer_id) else {
                continue;
            };
            let (runs, failures) = groups.entry(name.to_string()).or_default();
            *runs += 1;
            if e.status == FAILED_STATUS {
                *failures += 1;
            }
        }

        let mut rows: Vec<SlaMetric> = groups
            .into_iter()
            .map(|(customer_name, (total_runs, failures))| SlaMetric {
                customer_name,
                total_runs,
                failures,
                success_rate: percent_2dp(total_runs - failures, total_runs),
            })
            .collect();

        rows.sort_by(|a, b| a.success_rate.total_cmp(&b.success_rate));
        Ok(rows)
    }

    async fn top_failures(
        &self,
        window: LookbackDays,
        limit: i64,
    ) -> Result<Vec<FailureGroup>, StoreError> {
        let floor = instant_floor(window.days());
        let t = self.tables.read();
        let mut groups: BTreeMap<(String, String, Option<String>), (i64, DateTime<Utc>)> =
            BTreeMap::new();

        for e in t
            .events
            .iter()
            .filter(|e| e.event_type == EXECUTION_FAILED_EVENT && e.event_timestamp >= floor)
        {
            let Some(name) = t.customer_name(&e.customer_id) else {
                continue;
            };
            let key = (
                name.to_string(),
                e.notebook_name.clone(),
                e.error_message.clone(),
            );
            let entry = groups.entry(key).or_insert((0, e.event_timestamp));
            entry.0 += 1;
            entry.1 = entry.1.max(e.event_timestamp);
        }

        let mut rows: Vec<FailureGroup> = groups
            .into_iter()
            .map(
                |((customer_name, notebook_name, error_message), (count, last))| FailureGroup {
                    customer_name,
                    notebook_name,
                    error_message,
                    count,
                    last_occurrence: last,
                },
            )
            .collect();

        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_occurrence.cmp(&a.last_occurrence))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}
