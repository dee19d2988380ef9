//! Error taxonomy. Transient and parse failures never reach these
//! types — they are caught at the point of occurrence and folded into
//! `None`/empty results. Only configuration errors, invariant
//! violations, and a blown run deadline are fatal and abort a run before
//! any rules are returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("days_to_scan must be between 1 and 90, got {0}")]
    DaysToScanOutOfRange(i64),
    #[error("ping_count must be at least 1, got {0}")]
    PingCountOutOfRange(u32),
    #[error("refresh_concurrency must be at least 1, got {0}")]
    RefreshConcurrencyOutOfRange(usize),
    #[error("run_timeout_secs must be at least 1, got {0}")]
    RunTimeoutOutOfRange(u64),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum PingError {
    #[error("transport error reaching vantage: {0}")]
    Transport(String),
    #[error("remote command failed: {0}")]
    Command(String),
    #[error("could not parse ping output: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum RouteRuleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invariant violation: {0}")]
    Invariant(String),
    #[error("run exceeded its deadline")]
    Timeout,
}
