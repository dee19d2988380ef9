//! HostStatisticStore: persists per-host measurements. Real persistence
//! backends are a collaborator this crate doesn't own;
//! `InMemoryHostStatisticStore` is the reference implementation this crate
//! ships so the rest of the pipeline is testable end-to-end.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::HostStatistic;

#[async_trait]
pub trait HostStatisticStore: Send + Sync {
    async fn exists(&self, host: &str) -> bool;

    /// Does any stored record contain `host` in its `ip_addresses` set?
    /// The query string is checked against the *literal* set of IPs
    /// regardless of whether it itself parses as an IP or a DNS name.
    async fn ip_exists(&self, host: &str) -> bool;

    async fn find(&self, host: &str) -> Option<HostStatistic>;

    async fn find_by_ip(&self, ip: &str) -> Vec<HostStatistic>;

    async fn save(&self, statistic: HostStatistic);
}

#[derive(Default)]
pub struct InMemoryHostStatisticStore {
    records: Arc<RwLock<HashMap<String, HostStatistic>>>,
}

impl InMemoryHostStatisticStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HostStatisticStore for InMemoryHostStatisticStore {
    async fn exists(&self, host: &str) -> bool {
        self.records.read().await.contains_key(host)
    }

    async fn ip_exists(&self, host: &str) -> bool {
        self.records
            .read()
            .await
            .values()
            .any(|s| s.ip_addresses().contains(host))
    }

    async fn find(&self, host: &str) -> Option<HostStatistic> {
        self.records.read().await.get(host).cloned()
    }

    async fn find_by_ip(&self, ip: &str) -> Vec<HostStatistic> {
        self.records
            .read()
            .await
            .values()
            .filter(|s| s.ip_addresses().contains(ip))
            .cloned()
            .collect()
    }

    async fn save(&self, statistic: HostStatistic) {
        self.records
            .write()
            .await
            .insert(statistic.host.clone(), statistic);
    }
}
