//! HostClusterer: starting from a seed host, walks the equivalence graph
//! (IP-membership, apex-domain, temporal-correlation) to produce a
//! connected cluster, consuming matched hosts out of the candidate set.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::is_same_apex_domain;
use crate::events::EventStore;
use crate::model::HostStatistic;
use crate::store::HostStatisticStore;

pub struct HostClusterer {
    store: Arc<dyn HostStatisticStore>,
    events: Arc<dyn EventStore>,
    temporal_diff_seconds: i64,
}

impl HostClusterer {
    pub fn new(
        store: Arc<dyn HostStatisticStore>,
        events: Arc<dyn EventStore>,
        temporal_diff_seconds: i64,
    ) -> Self {
        HostClusterer {
            store,
            events,
            temporal_diff_seconds,
        }
    }

    /// Breadth-first traversal of the equivalence graph. `candidates`
    /// shrinks monotonically as hosts are consumed into the returned
    /// cluster.
    pub async fn cluster(
        &self,
        seed: HostStatistic,
        candidates: &mut HashSet<String>,
    ) -> Vec<HostStatistic> {
        let mut result = vec![seed];
        let mut i = 0;

        while i < result.len() {
            let cur_host = result[i].host.clone();
            let cur_is_ip = result[i].is_ip_address;

            let correlated = self
                .events
                .find_correlated_hosts(&cur_host, self.temporal_diff_seconds)
                .await;
            let mut peers: HashSet<String> = result[i].ip_addresses();
            peers.extend(correlated);
            peers.retain(|h| candidates.contains(h));

            for peer in &peers {
                if let Some(s) = self.store.find(peer).await {
                    result.push(s);
                }
                candidates.remove(peer);
            }

            if cur_is_ip {
                let siblings = self.store.find_by_ip(&cur_host).await;
                for s in siblings {
                    if candidates.contains(&s.host) {
                        candidates.remove(&s.host);
                        result.push(s);
                    }
                }
            } else {
                let sib_hosts: Vec<String> = candidates
                    .iter()
                    .filter(|h| is_same_apex_domain(h, &cur_host))
                    .cloned()
                    .collect();
                for h in sib_hosts {
                    candidates.remove(&h);
                    if let Some(s) = self.store.find(&h).await {
                        result.push(s);
                    }
                }
            }

            i += 1;
        }

        result
    }
}
