//! EventStore: supplies hosts accessed in a time window and hosts
//! temporally correlated with a given host. Real event backends are
//! a collaborator this crate doesn't own; `InMemoryEventStore` computes
//! the correlation predicate locally over a flat list of events.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::model::{SocketEvent, TimeWindow};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn aggregate_on_hosts(&self, window: TimeWindow) -> HashSet<String>;

    /// Every other host `h'` such that, of all access timestamps of `host`,
    /// the fraction that have *any* access of `h'` within `±diff_seconds`
    /// exceeds 0.95.
    async fn find_correlated_hosts(&self, host: &str, diff_seconds: i64) -> HashSet<String>;
}

const CORRELATION_THRESHOLD: f64 = 0.95;

pub struct InMemoryEventStore {
    events: Vec<SocketEvent>,
}

impl InMemoryEventStore {
    pub fn new(events: Vec<SocketEvent>) -> Self {
        InMemoryEventStore { events }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn aggregate_on_hosts(&self, window: TimeWindow) -> HashSet<String> {
        self.events
            .iter()
            .filter(|e| e.access_timestamp >= window.from && e.access_timestamp < window.to)
            .map(|e| e.host.clone())
            .collect()
    }

    async fn find_correlated_hosts(&self, host: &str, diff_seconds: i64) -> HashSet<String> {
        correlated_hosts(&self.events, host, diff_seconds)
    }
}

/// For `host`, group its accesses sequentially (one group per access); for
/// each candidate host, count how many of those groups contain at least one
/// candidate access within `diff_seconds`; keep candidates whose fraction
/// exceeds `CORRELATION_THRESHOLD`. Degrades to empty when `host` has fewer
/// than two accesses.
fn correlated_hosts(events: &[SocketEvent], host: &str, diff_seconds: i64) -> HashSet<String> {
    let host_timestamps: Vec<_> = events
        .iter()
        .filter(|e| e.host == host)
        .map(|e| e.access_timestamp)
        .collect();

    if host_timestamps.len() < 2 {
        return HashSet::new();
    }

    let tolerance = chrono::Duration::seconds(diff_seconds);
    let candidates: HashSet<&str> = events
        .iter()
        .map(|e| e.host.as_str())
        .filter(|h| *h != host)
        .collect();

    let mut result = HashSet::new();
    for candidate in candidates {
        let candidate_timestamps: Vec<_> = events
            .iter()
            .filter(|e| e.host == candidate)
            .map(|e| e.access_timestamp)
            .collect();

        let matched_groups = host_timestamps
            .iter()
            .filter(|&&ts| {
                candidate_timestamps
                    .iter()
                    .any(|&cts| (cts - ts).abs() <= tolerance)
            })
            .count();

        let fraction = matched_groups as f64 / host_timestamps.len() as f64;
        if fraction > CORRELATION_THRESHOLD {
            result.insert(candidate.to_string());
        }
    }
    result
}
