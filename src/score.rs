//! RouteScorer: aggregates measurements across a cluster into a
//! per-region score and picks the winner under tie-break rules.

use std::collections::BTreeMap;

use crate::model::{HostStatistic, Measurement};

/// `-1.0` marks a region poisoned by an unreachable measurement; once
/// poisoned, a region never accumulates further and can never win.
const POISONED: f64 = -1.0;

pub struct RouteScorer;

impl RouteScorer {
    /// `statistics` must be non-empty. Other-continent iteration is ordered
    /// by continent tag (a `BTreeMap`) so ties resolve reproducibly.
    pub fn determine_route(statistics: &[HostStatistic]) -> String {
        let mut central = 0.0_f64;
        let mut domestic = 0.0_f64;
        let mut others: BTreeMap<String, f64> = BTreeMap::new();
        for statistic in statistics {
            for continent in statistic.other_continents.keys() {
                others.entry(continent.clone()).or_insert(0.0);
            }
        }

        for statistic in statistics {
            add_to_score(&mut central, statistic.central.as_ref());
            add_to_score(&mut domestic, statistic.domestic.as_ref());
            for (continent, score) in others.iter_mut() {
                add_to_score(score, statistic.other_continents.get(continent));
            }
        }

        let mut winner = "central".to_string();
        let mut max = central;
        if domestic > max {
            max = domestic;
            winner = "domestic".to_string();
        }
        for (continent, score) in &others {
            if *score > max {
                max = *score;
                winner = continent.clone();
            }
        }
        winner
    }
}

/// Poisons the region's score to `-1` on an absent or unreachable
/// measurement; once poisoned, ignores further contributions. Otherwise
/// adds the success ratio `packets_received / packets_transmitted`.
fn add_to_score(score: &mut f64, measurement: Option<&Measurement>) {
    match measurement {
        None => {
            *score = POISONED;
        }
        Some(m) if !m.is_reachable() => {
            *score = POISONED;
        }
        Some(_) if *score < 0.0 => {}
        Some(m) => {
            *score += m.packets_received as f64 / m.packets_transmitted as f64;
        }
    }
}
