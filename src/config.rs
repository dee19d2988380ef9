//! Analyzer configuration, loaded the way production crates in this
//! pack externalize settings: layered defaults, an optional file, then
//! environment variables, validated once at startup before any I/O.

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    pub days_to_scan: i64,
    pub ping_count: u32,
    #[serde(default)]
    pub continents: Vec<String>,
    #[serde(default = "default_refresh_concurrency")]
    pub refresh_concurrency: usize,
    #[serde(default = "default_temporal_diff_seconds")]
    pub temporal_diff_seconds: i64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_refresh_concurrency() -> usize {
    16
}

fn default_temporal_diff_seconds() -> i64 {
    30
}

fn default_run_timeout_secs() -> u64 {
    300
}

impl AnalyzerConfig {
    /// Loads from (in increasing priority) built-in defaults, an optional
    /// `config_path` TOML file, then `ROUTE_ANALYZER_*` environment
    /// variables, and validates the result.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("ping_count", 3)?
            .set_default("days_to_scan", 7)?
            .set_default("refresh_concurrency", default_refresh_concurrency() as i64)?
            .set_default("temporal_diff_seconds", default_temporal_diff_seconds())?
            .set_default("run_timeout_secs", default_run_timeout_secs() as i64)?;

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("ROUTE_ANALYZER"));

        let raw: Self = builder.build()?.try_deserialize()?;
        raw.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=90).contains(&self.days_to_scan) {
            return Err(ConfigError::DaysToScanOutOfRange(self.days_to_scan));
        }
        if self.ping_count < 1 {
            return Err(ConfigError::PingCountOutOfRange(self.ping_count));
        }
        if self.refresh_concurrency < 1 {
            return Err(ConfigError::RefreshConcurrencyOutOfRange(
                self.refresh_concurrency,
            ));
        }
        if self.run_timeout_secs < 1 {
            return Err(ConfigError::RunTimeoutOutOfRange(self.run_timeout_secs));
        }
        Ok(self)
    }

    /// Per-vantage timeout: `ping_count * 1.5s + 5s`.
    pub fn per_vantage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.ping_count as f64 * 1.5 + 5.0)
    }

    /// Whole-run deadline that bounds a single `Analyzer::run` invocation.
    pub fn run_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_timeout_secs)
    }
}
