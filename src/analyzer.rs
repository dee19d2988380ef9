//! Analyzer: top-level orchestrator producing the final per-region
//! host lists from an event window, bounded vantage measurements, clusters,
//! and scores.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::cluster::HostClusterer;
use crate::config::AnalyzerConfig;
use crate::error::RouteRuleError;
use crate::events::EventStore;
use crate::model::{RouteRules, TimeWindow};
use crate::refresh::RefreshRunner;
use crate::score::RouteScorer;
use crate::store::HostStatisticStore;

pub struct Analyzer {
    events: Arc<dyn EventStore>,
    store: Arc<dyn HostStatisticStore>,
    refresh_runner: RefreshRunner,
    clusterer: HostClusterer,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(
        events: Arc<dyn EventStore>,
        store: Arc<dyn HostStatisticStore>,
        refresh_runner: RefreshRunner,
        config: AnalyzerConfig,
    ) -> Self {
        let clusterer = HostClusterer::new(
            store.clone(),
            events.clone(),
            config.temporal_diff_seconds,
        );
        Analyzer {
            events,
            store,
            refresh_runner,
            clusterer,
            config,
        }
    }

    /// Builds the event window, refreshes measurements, then repeatedly
    /// pops a seed host, clusters it, scores the cluster, and files the
    /// winning region's hosts (discarding `central`). The whole run is
    /// bounded by `config.run_timeout_secs`; a blown deadline aborts
    /// without returning any rules.
    pub async fn run(&self) -> Result<RouteRules, RouteRuleError> {
        tokio::time::timeout(self.config.run_timeout(), self.run_inner())
            .await
            .map_err(|_| RouteRuleError::Timeout)?
    }

    async fn run_inner(&self) -> Result<RouteRules, RouteRuleError> {
        let window = TimeWindow::past_days(self.config.days_to_scan, Utc::now());
        let mut hosts = self.events.aggregate_on_hosts(window).await;
        info!(host_count = hosts.len(), "aggregated hosts for window");

        self.refresh_runner
            .refresh_all(&hosts, self.config.ping_count)
            .await;

        let mut rules: RouteRules = BTreeMap::new();
        rules.insert("domestic".to_string(), Vec::new());
        for continent in &self.config.continents {
            rules.insert(continent.clone(), Vec::new());
        }

        while let Some(seed_host) = hosts.iter().next().cloned() {
            hosts.remove(&seed_host);
            let seed = self.store.find(&seed_host).await.ok_or_else(|| {
                RouteRuleError::Invariant(format!(
                    "refresh_all guaranteed {seed_host} would be saved, but it was not found"
                ))
            })?;

            let cluster = self.clusterer.cluster(seed, &mut hosts).await;
            for statistic in &cluster {
                statistic
                    .check_invariants()
                    .map_err(RouteRuleError::Invariant)?;
            }
            let winner = RouteScorer::determine_route(&cluster);

            if let Some(list) = rules.get_mut(&winner) {
                list.extend(cluster.into_iter().map(|s| s.host));
            }
        }

        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PingError;
    use crate::events::InMemoryEventStore;
    use crate::model::{Measurement, SocketEvent};
    use crate::store::InMemoryHostStatisticStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashSet;

    struct FixedVantage {
        name: &'static str,
        response: Option<(u32, u32)>,
    }

    #[async_trait]
    impl crate::vantage::VantagePoint for FixedVantage {
        fn name(&self) -> &str {
            self.name
        }

        async fn ping(&self, _host: &str, count: u32) -> Result<Measurement, PingError> {
            match self.response {
                Some((_, received)) => Ok(Measurement {
                    destination_ip: "1.1.1.1".to_string(),
                    packets_transmitted: count,
                    packets_received: received,
                    rtt_min: None,
                    rtt_avg: None,
                    rtt_max: None,
                    rtt_stddev: None,
                }),
                None => Err(PingError::Transport("down".to_string())),
            }
        }
    }

    fn config(continents: Vec<&str>) -> AnalyzerConfig {
        AnalyzerConfig {
            days_to_scan: 7,
            ping_count: 10,
            continents: continents.into_iter().map(String::from).collect(),
            refresh_concurrency: 4,
            temporal_diff_seconds: 30,
            run_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn single_host_domestic_tie_loses_to_central_and_is_omitted() {
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new(vec![SocketEvent {
            host: "d1".to_string(),
            port: 443,
            access_timestamp: Utc::now() - Duration::hours(1),
        }]));
        let store: Arc<dyn HostStatisticStore> = Arc::new(InMemoryHostStatisticStore::new());
        let refresh_runner = RefreshRunner::new(
            store.clone(),
            Arc::new(FixedVantage {
                name: "central",
                response: Some((10, 10)),
            }),
            Arc::new(FixedVantage {
                name: "domestic",
                response: Some((10, 10)),
            }),
            vec![],
            4,
        );
        let analyzer = Analyzer::new(events, store, refresh_runner, config(vec![]));
        let rules = analyzer.run().await.unwrap();
        assert_eq!(rules.get("domestic"), Some(&Vec::<String>::new()));
    }

    #[tokio::test]
    async fn domestic_strictly_better_routes_there() {
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new(vec![SocketEvent {
            host: "d1".to_string(),
            port: 443,
            access_timestamp: Utc::now() - Duration::hours(1),
        }]));
        let store: Arc<dyn HostStatisticStore> = Arc::new(InMemoryHostStatisticStore::new());
        let refresh_runner = RefreshRunner::new(
            store.clone(),
            Arc::new(FixedVantage {
                name: "central",
                response: Some((10, 8)),
            }),
            Arc::new(FixedVantage {
                name: "domestic",
                response: Some((10, 10)),
            }),
            vec![],
            4,
        );
        let analyzer = Analyzer::new(events, store, refresh_runner, config(vec![]));
        let rules = analyzer.run().await.unwrap();
        assert_eq!(rules.get("domestic"), Some(&vec!["d1".to_string()]));
    }

    #[tokio::test]
    async fn ap_strictly_best_routes_there_and_leaves_other_continents_empty() {
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new(vec![SocketEvent {
            host: "d1".to_string(),
            port: 443,
            access_timestamp: Utc::now() - Duration::hours(1),
        }]));
        let store: Arc<dyn HostStatisticStore> = Arc::new(InMemoryHostStatisticStore::new());
        let refresh_runner = RefreshRunner::new(
            store.clone(),
            Arc::new(FixedVantage {
                name: "central",
                response: None,
            }),
            Arc::new(FixedVantage {
                name: "domestic",
                response: None,
            }),
            vec![
                (
                    "ap".to_string(),
                    Arc::new(FixedVantage {
                        name: "ap",
                        response: Some((10, 10)),
                    }),
                ),
                (
                    "eu".to_string(),
                    Arc::new(FixedVantage {
                        name: "eu",
                        response: None,
                    }),
                ),
            ],
            4,
        );
        let analyzer = Analyzer::new(events, store, refresh_runner, config(vec!["ap", "eu"]));
        let rules = analyzer.run().await.unwrap();
        assert_eq!(rules.get("ap"), Some(&vec!["d1".to_string()]));
        assert_eq!(rules.get("eu"), Some(&Vec::<String>::new()));
    }

    #[tokio::test]
    async fn output_hosts_are_a_subset_of_the_aggregated_window() {
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new(vec![SocketEvent {
            host: "d1".to_string(),
            port: 443,
            access_timestamp: Utc::now() - Duration::hours(1),
        }]));
        let store: Arc<dyn HostStatisticStore> = Arc::new(InMemoryHostStatisticStore::new());
        let refresh_runner = RefreshRunner::new(
            store.clone(),
            Arc::new(FixedVantage {
                name: "central",
                response: Some((10, 2)),
            }),
            Arc::new(FixedVantage {
                name: "domestic",
                response: Some((10, 10)),
            }),
            vec![],
            4,
        );
        let analyzer = Analyzer::new(events, store, refresh_runner, config(vec![]));
        let rules = analyzer.run().await.unwrap();
        let all_hosts: HashSet<&String> = rules.values().flatten().collect();
        assert!(all_hosts.iter().all(|h| h.as_str() == "d1"));
    }
}
