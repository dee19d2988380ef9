//! Core data types shared across the analyzer.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of one `ping` run against a single destination.
///
/// `packets_received == 0` denotes an unreachable measurement; RTT fields
/// are only populated when at least one packet came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub destination_ip: String,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_min: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_avg: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_max: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_stddev: Option<Decimal>,
}

impl Measurement {
    pub fn is_reachable(&self) -> bool {
        self.packets_received > 0
    }
}

/// One probed host's record, as persisted by `HostStatisticStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStatistic {
    pub host: String,
    pub is_ip_address: bool,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub central: Option<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domestic: Option<Measurement>,
    #[serde(default)]
    pub other_continents: BTreeMap<String, Measurement>,
}

impl HostStatistic {
    pub fn new(host: impl Into<String>, is_ip_address: bool, last_updated: DateTime<Utc>) -> Self {
        HostStatistic {
            host: host.into(),
            is_ip_address,
            last_updated,
            central: None,
            domestic: None,
            other_continents: BTreeMap::new(),
        }
    }

    /// All non-null destination IPs observed across every vantage, or
    /// `{host}` when this record itself names an IP literal.
    pub fn ip_addresses(&self) -> HashSet<String> {
        if self.is_ip_address {
            return HashSet::from([self.host.clone()]);
        }
        let mut result = HashSet::new();
        if let Some(m) = &self.central {
            result.insert(m.destination_ip.clone());
        }
        if let Some(m) = &self.domestic {
            result.insert(m.destination_ip.clone());
        }
        for m in self.other_continents.values() {
            result.insert(m.destination_ip.clone());
        }
        result
    }

    pub fn measurement_for(&self, region: &str) -> Option<&Measurement> {
        match region {
            "central" => self.central.as_ref(),
            "domestic" => self.domestic.as_ref(),
            continent => self.other_continents.get(continent),
        }
    }

    /// Checks every measurement this record carries for
    /// `packets_received <= packets_transmitted`. A store that hands back a
    /// record violating this is corrupt and must not feed into scoring.
    pub fn check_invariants(&self) -> Result<(), String> {
        let regions = std::iter::once(("central", self.central.as_ref()))
            .chain(std::iter::once(("domestic", self.domestic.as_ref())))
            .chain(
                self.other_continents
                    .iter()
                    .map(|(tag, m)| (tag.as_str(), Some(m))),
            );
        for (region, measurement) in regions {
            if let Some(m) = measurement
                && m.packets_received > m.packets_transmitted
            {
                return Err(format!(
                    "host {}: {region} measurement has packets_received ({}) > packets_transmitted ({})",
                    self.host, m.packets_received, m.packets_transmitted
                ));
            }
        }
        Ok(())
    }
}

/// One access to `host:port` recorded in the event log. Append-only,
/// owned by a collaborator outside this crate's scope; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEvent {
    pub host: String,
    pub port: u16,
    pub access_timestamp: DateTime<Utc>,
}

/// Region tag -> ordered list of hosts that should egress through it.
/// `central` never appears as a key.
pub type RouteRules = BTreeMap<String, Vec<String>>;

/// Serializes a single region's host list in the publisher's document shape:
/// `payload:\n  - host1\n  - host2\n` or `payload: []` when empty.
pub fn region_to_yaml(hosts: &[String]) -> Result<String, serde_yaml::Error> {
    #[derive(Serialize)]
    struct Payload<'a> {
        payload: &'a [String],
    }
    serde_yaml::to_string(&Payload { payload: hosts })
}

/// The `[from, to)` window events are aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn past_days(days_delta: i64, now: DateTime<Utc>) -> Self {
        TimeWindow {
            from: now - chrono::Duration::days(days_delta),
            to: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(ip: &str, received: u32) -> Measurement {
        Measurement {
            destination_ip: ip.to_string(),
            packets_transmitted: 10,
            packets_received: received,
            rtt_min: None,
            rtt_avg: None,
            rtt_max: None,
            rtt_stddev: None,
        }
    }

    #[test]
    fn check_invariants_accepts_well_formed_measurements() {
        let mut s = HostStatistic::new("example.com", false, Utc::now());
        s.central = Some(measurement("1.1.1.1", 10));
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn check_invariants_rejects_received_exceeding_transmitted() {
        let mut s = HostStatistic::new("example.com", false, Utc::now());
        s.central = Some(Measurement {
            destination_ip: "1.1.1.1".to_string(),
            packets_transmitted: 5,
            packets_received: 9,
            rtt_min: None,
            rtt_avg: None,
            rtt_max: None,
            rtt_stddev: None,
        });
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn ip_addresses_degenerates_for_ip_literal_hosts() {
        let s = HostStatistic::new("1.2.3.4", true, Utc::now());
        assert_eq!(s.ip_addresses(), HashSet::from(["1.2.3.4".to_string()]));
    }

    #[test]
    fn ip_addresses_unions_all_vantages() {
        let mut s = HostStatistic::new("example.com", false, Utc::now());
        s.central = Some(measurement("1.1.1.1", 10));
        s.domestic = Some(measurement("2.2.2.2", 10));
        s.other_continents
            .insert("ap".to_string(), measurement("3.3.3.3", 10));
        assert_eq!(
            s.ip_addresses(),
            HashSet::from([
                "1.1.1.1".to_string(),
                "2.2.2.2".to_string(),
                "3.3.3.3".to_string()
            ])
        );
    }

    #[test]
    fn ip_addresses_is_idempotent() {
        let mut s = HostStatistic::new("example.com", false, Utc::now());
        s.central = Some(measurement("1.1.1.1", 10));
        assert_eq!(s.ip_addresses(), s.ip_addresses());
    }

    #[test]
    fn region_to_yaml_empty_list() {
        let yaml = region_to_yaml(&[]).unwrap();
        assert!(yaml.contains("payload: []"));
    }

    #[test]
    fn region_to_yaml_lists_hosts() {
        let yaml = region_to_yaml(&["host1".to_string(), "host2".to_string()]).unwrap();
        assert!(yaml.contains("- host1"));
        assert!(yaml.contains("- host2"));
    }
}
