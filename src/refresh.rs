//! RefreshRunner: ensures the store contains a fresh `HostStatistic`
//! for every host in an input set, fanning measurement out across vantages
//! and across hosts up to a bounded concurrency.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::domain::is_ip_address;
use crate::model::{HostStatistic, Measurement};
use crate::store::HostStatisticStore;
use crate::vantage::VantagePoint;

pub struct RefreshRunner {
    store: Arc<dyn HostStatisticStore>,
    central: Arc<dyn VantagePoint>,
    domestic: Arc<dyn VantagePoint>,
    continents: Vec<(String, Arc<dyn VantagePoint>)>,
    concurrency: usize,
}

impl RefreshRunner {
    pub fn new(
        store: Arc<dyn HostStatisticStore>,
        central: Arc<dyn VantagePoint>,
        domestic: Arc<dyn VantagePoint>,
        continents: Vec<(String, Arc<dyn VantagePoint>)>,
        concurrency: usize,
    ) -> Self {
        RefreshRunner {
            store,
            central,
            domestic,
            continents,
            concurrency,
        }
    }

    pub async fn refresh_all(&self, hosts: &HashSet<String>, ping_count: u32) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let tasks = hosts.iter().map(|host| {
            let host = host.clone();
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                self.refresh_one(&host, ping_count).await;
            }
        });
        join_all(tasks).await;
    }

    async fn refresh_one(&self, host: &str, ping_count: u32) {
        if self.store.exists(host).await || self.store.ip_exists(host).await {
            return;
        }

        let mut statistic = HostStatistic::new(host, is_ip_address(host), Utc::now());

        let central_fut = fold_vantage_result(self.central.as_ref(), host, ping_count);
        let domestic_fut = fold_vantage_result(self.domestic.as_ref(), host, ping_count);
        let continent_futs = self
            .continents
            .iter()
            .map(|(tag, vp)| async move { (tag.clone(), fold_vantage_result(vp.as_ref(), host, ping_count).await) });

        let (central, domestic, continent_results) = tokio::join!(
            central_fut,
            domestic_fut,
            join_all(continent_futs),
        );

        statistic.central = central;
        statistic.domestic = domestic;
        for (tag, measurement) in continent_results {
            if let Some(m) = measurement {
                statistic.other_continents.insert(tag, m);
            }
        }

        self.store.save(statistic).await;
    }
}

/// Runs a single vantage's ping and folds any failure to `None`, logging it.
/// A failed vantage never aborts the others' probes.
async fn fold_vantage_result(
    vantage: &dyn VantagePoint,
    host: &str,
    ping_count: u32,
) -> Option<Measurement> {
    match vantage.ping(host, ping_count).await {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(vantage = vantage.name(), %host, error = %e, "vantage ping failed");
            None
        }
    }
}
