use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use route_rule_analyzer::Analyzer;
use route_rule_analyzer::config::AnalyzerConfig;
use route_rule_analyzer::events::InMemoryEventStore;
use route_rule_analyzer::model::{SocketEvent, region_to_yaml};
use route_rule_analyzer::refresh::RefreshRunner;
use route_rule_analyzer::store::InMemoryHostStatisticStore;
use route_rule_analyzer::vantage::{IcmpVantagePoint, VantagePoint};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "route-rule-analyzer")]
#[command(about = "Clusters observed hosts and scores them for egress routing", long_about = None)]
struct Args {
    /// Path to a TOML configuration file (overlaid with ROUTE_ANALYZER_* env vars)
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Increase logging verbosity (-v for WARN, -vv for INFO)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Reads socket events as newline-delimited JSON from stdin, one
/// `SocketEvent` object per line. Blank lines are skipped.
fn read_events_from_stdin() -> anyhow::Result<Vec<SocketEvent>> {
    let stdin = io::stdin();
    let mut events = Vec::new();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }
    Ok(events)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "error",
        1 => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = match AnalyzerConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    info!(
        days_to_scan = config.days_to_scan,
        ping_count = config.ping_count,
        continents = ?config.continents,
        "starting route rule analysis"
    );

    let events = read_events_from_stdin()?;
    info!("read {} socket events from stdin", events.len());

    let event_store = Arc::new(InMemoryEventStore::new(events));
    let host_store = Arc::new(InMemoryHostStatisticStore::new());

    let per_vantage_timeout = config.per_vantage_timeout();
    let central = build_vantage("central", per_vantage_timeout)?;
    let domestic = build_vantage("domestic", per_vantage_timeout)?;
    let mut continent_vantages = Vec::new();
    for continent in &config.continents {
        continent_vantages.push((continent.clone(), build_vantage(continent, per_vantage_timeout)?));
    }

    let refresh_runner = RefreshRunner::new(
        host_store.clone(),
        central,
        domestic,
        continent_vantages,
        config.refresh_concurrency,
    );

    let analyzer = Analyzer::new(event_store, host_store, refresh_runner, config);

    let rules = match analyzer.run().await {
        Ok(rules) => rules,
        Err(e) => {
            error!("analysis aborted: {e}");
            std::process::exit(1);
        }
    };

    for (region, hosts) in &rules {
        match region_to_yaml(hosts) {
            Ok(doc) => println!("# {region}\n{doc}"),
            Err(e) => warn!("failed to serialize region {region}: {e}"),
        }
    }

    Ok(())
}

fn build_vantage(name: &str, timeout: Duration) -> anyhow::Result<Arc<dyn VantagePoint>> {
    Ok(Arc::new(IcmpVantagePoint::new(name.to_string(), timeout)?))
}
