//! Startup configuration.
//!
//! The positional command line fixes the shard's identity (dataset, listen
//! address, cores, shard slot). Tunables that operators adjust between
//! experiments are layered with figment:
//! 1. Environment variables prefixed `CF_SHARD_` (highest priority)
//! 2. `cf_shard.yaml` (if exists)
//! 3. `cf_shard.toml` (if exists)
//! 4. Built-in defaults (lowest priority)

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::constants::cli::ALL_CORES;
use crate::constants::dispersion::DEFAULT_MAX_DELAY_US;
use crate::constants::factorization::{DEFAULT_ITERATIONS, DEFAULT_RANK, DEFAULT_SEED};
use crate::constants::runtime::{CONFIG_TOML, CONFIG_YAML, DEFAULT_MAX_BLOCKING_THREADS, ENV_PREFIX};
use crate::constants::telemetry::PROC_STAT_PATH;
use crate::error::{AppError, ConfigError, Result};
use crate::model::{DatasetFormat, FactorizationParams};

/// Positional command line of the shard server.
#[derive(Debug, Clone, Parser)]
#[command(name = "cf-shard-server", version)]
#[command(about = "Collaborative-filtering compute shard with load telemetry")]
pub struct ShardArgs {
    /// Path to the ratings dataset
    pub dataset: PathBuf,

    /// Listen address as IP:port or host:port
    pub listen: String,

    /// Dataset mode: 1 = text triples, 2 = binary records
    #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
    pub mode: u8,

    /// Number of cores to use; -1 for all cores on the machine
    #[arg(allow_negative_numbers = true)]
    pub cores: i32,

    /// Index of this shard, starting at 0
    pub shard_index: u32,

    /// Total number of shards in the tier
    pub shard_count: u32,
}

impl ShardArgs {
    /// Check the arguments clap cannot express on its own.
    pub fn validate(&self) -> Result<()> {
        if self.cores == 0 || self.cores < ALL_CORES {
            return Err(ConfigError::Validation(format!(
                "core count must be -1 or a positive number, got {}",
                self.cores
            ))
            .into());
        }

        if self.shard_count == 0 {
            return Err(ConfigError::Validation("shard count must be at least 1".to_string()).into());
        }
        if self.shard_index >= self.shard_count {
            return Err(ConfigError::Validation(format!(
                "shard index {} is out of range for {} shards",
                self.shard_index, self.shard_count
            ))
            .into());
        }

        let port = self
            .listen
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .and_then(|(_, port)| port.parse::<u16>().ok());
        if port.is_none() {
            return Err(ConfigError::Validation(format!(
                "listen address must be host:port, got {:?}",
                self.listen
            ))
            .into());
        }

        Ok(())
    }

    pub fn dataset_format(&self) -> Result<DatasetFormat> {
        DatasetFormat::try_from(self.mode).map_err(AppError::from)
    }

    /// One-line usage of the positional contract.
    pub fn usage() -> String {
        Self::command().render_usage().to_string()
    }

    /// Resolve the core argument against the host's core count.
    pub fn worker_threads(&self, available: usize) -> usize {
        resolve_cores(self.cores, available)
    }
}

/// Operator-facing report for a failed startup.
///
/// Argument and listen-address failures are followed by the usage line.
pub fn startup_diagnostic(err: &AppError) -> String {
    match err {
        AppError::Configuration(_) => format!("error: {}\n\n{}", err, ShardArgs::usage()),
        _ => format!("error: {}", err),
    }
}

/// `-1` or a request above what the host has means every core.
pub fn resolve_cores(requested: i32, available: usize) -> usize {
    let available = available.max(1);
    if requested == ALL_CORES || requested <= 0 {
        return available;
    }
    (requested as usize).min(available)
}

// Default value functions for serde defaults
fn default_dispersion_max_us() -> u64 { DEFAULT_MAX_DELAY_US }
fn default_factorization_rank() -> usize { DEFAULT_RANK }
fn default_factorization_iterations() -> usize { DEFAULT_ITERATIONS }
fn default_factorization_seed() -> u64 { DEFAULT_SEED }
fn default_proc_stat_path() -> PathBuf { PathBuf::from(PROC_STAT_PATH) }
fn default_max_blocking_threads() -> usize { DEFAULT_MAX_BLOCKING_THREADS }
fn default_log_level() -> String { "info".to_string() }

/// Operator tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardTuning {
    /// Exclusive bound of the dispersion busy-wait in microseconds; 0 disables it
    #[serde(default = "default_dispersion_max_us")]
    pub dispersion_max_us: u64,

    /// Serialize prediction calls behind one process-wide lock
    #[serde(default)]
    pub serialize_predictions: bool,

    /// Latent rank of the factorization
    #[serde(default = "default_factorization_rank")]
    pub factorization_rank: usize,

    /// Alternating update sweeps
    #[serde(default = "default_factorization_iterations")]
    pub factorization_iterations: usize,

    /// Seed for factor initialisation
    #[serde(default = "default_factorization_seed")]
    pub factorization_seed: u64,

    /// Source of host CPU counters
    #[serde(default = "default_proc_stat_path")]
    pub proc_stat_path: PathBuf,

    /// Size of the blocking pool requests execute on
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,

    /// Prometheus scrape address; exporter disabled when unset
    #[serde(default)]
    pub metrics_listen: Option<String>,

    /// Log level filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ShardTuning {
    fn default() -> Self {
        Self {
            dispersion_max_us: default_dispersion_max_us(),
            serialize_predictions: false,
            factorization_rank: default_factorization_rank(),
            factorization_iterations: default_factorization_iterations(),
            factorization_seed: default_factorization_seed(),
            proc_stat_path: default_proc_stat_path(),
            max_blocking_threads: default_max_blocking_threads(),
            metrics_listen: None,
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl ShardTuning {
    /// Load tunables from defaults, config files and the environment.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(ShardTuning::default()))
                .merge(Toml::file(CONFIG_TOML))
                .merge(Yaml::file(CONFIG_YAML))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extract and validate tunables from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let tuning: ShardTuning = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        tuning.validate()?;
        Ok(tuning)
    }

    fn validate(&self) -> Result<()> {
        if self.factorization_rank == 0 {
            return Err(ConfigError::Validation("factorization_rank must be at least 1".to_string()).into());
        }
        if self.factorization_iterations == 0 {
            return Err(ConfigError::Validation(
                "factorization_iterations must be at least 1".to_string(),
            )
            .into());
        }
        if self.max_blocking_threads == 0 {
            return Err(ConfigError::Validation("max_blocking_threads must be at least 1".to_string()).into());
        }
        self.metrics_addr()?;
        Ok(())
    }

    /// Parsed Prometheus listen address, if configured.
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics_listen
            .as_deref()
            .map(|addr| {
                addr.parse::<SocketAddr>().map_err(|_| {
                    ConfigError::Validation(format!("metrics_listen {:?} is not IP:port", addr)).into()
                })
            })
            .transpose()
    }

    pub fn factorization(&self) -> FactorizationParams {
        FactorizationParams {
            rank: self.factorization_rank,
            iterations: self.factorization_iterations,
            seed: self.factorization_seed,
        }
    }

    /// Export tunables to TOML format
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Load(format!("Failed to serialize to TOML: {}", e)).into())
    }
}

/// Complete startup configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub args: ShardArgs,
    pub tuning: ShardTuning,
}

impl Config {
    /// Validate arguments and load tunables.
    pub fn load(args: ShardArgs) -> Result<Self> {
        args.validate()?;
        let tuning = ShardTuning::load()?;
        Ok(Self { args, tuning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> std::result::Result<ShardArgs, clap::Error> {
        let mut argv = vec!["cf-shard-server"];
        argv.extend_from_slice(extra);
        ShardArgs::try_parse_from(argv)
    }

    #[test]
    fn test_parse_positional_arguments() {
        let parsed = args(&["ratings.txt", "0.0.0.0:50051", "1", "-1", "0", "4"]).unwrap();

        assert_eq!(parsed.dataset, PathBuf::from("ratings.txt"));
        assert_eq!(parsed.listen, "0.0.0.0:50051");
        assert_eq!(parsed.mode, 1);
        assert_eq!(parsed.cores, -1);
        assert_eq!((parsed.shard_index, parsed.shard_count), (0, 4));
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.dataset_format().unwrap(), DatasetFormat::Text);
    }

    #[test]
    fn test_rejects_malformed_arguments() {
        assert!(args(&["ratings.txt", "0.0.0.0:50051", "1", "-1", "0"]).is_err());
        assert!(args(&["ratings.txt", "0.0.0.0:50051", "3", "-1", "0", "1"]).is_err());
        assert!(args(&["ratings.txt", "0.0.0.0:50051", "1", "many", "0", "1"]).is_err());

        let bad_index = args(&["r.txt", "localhost:1", "1", "2", "4", "4"]).unwrap();
        assert!(bad_index.validate().is_err());

        let bad_cores = args(&["r.txt", "localhost:1", "1", "0", "0", "1"]).unwrap();
        assert!(bad_cores.validate().is_err());

        let bad_addr = args(&["r.txt", "localhost", "1", "2", "0", "1"]).unwrap();
        assert!(bad_addr.validate().is_err());

        let bad_port = args(&["r.txt", "localhost:99999", "1", "2", "0", "1"]).unwrap();
        assert!(bad_port.validate().is_err());
    }

    #[test]
    fn test_startup_diagnostic_includes_usage() {
        let bad_index = args(&["r.txt", "localhost:1", "1", "2", "4", "4"]).unwrap();
        let err = bad_index.validate().unwrap_err();
        let report = startup_diagnostic(&err);

        assert!(report.starts_with("error: "));
        assert!(report.contains("shard index 4 is out of range"));
        assert!(report.contains("Usage:"));
        assert!(report.contains("<DATASET>"));
        assert!(report.contains("<SHARD_COUNT>"));

        let listen = AppError::from(ConfigError::Listen {
            addr: "10.255.255.1:80".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrNotAvailable),
        });
        assert!(startup_diagnostic(&listen).contains("Usage:"));

        let dataset = AppError::Dataset(crate::error::DatasetError::Empty);
        assert!(!startup_diagnostic(&dataset).contains("Usage:"));
    }

    #[test]
    fn test_resolve_cores() {
        assert_eq!(resolve_cores(-1, 8), 8);
        assert_eq!(resolve_cores(4, 8), 4);
        assert_eq!(resolve_cores(16, 8), 8);
        assert_eq!(resolve_cores(-1, 0), 1);
    }

    #[test]
    fn test_tuning_defaults_and_overrides() {
        let tuning = ShardTuning::from_figment(Figment::from(Serialized::defaults(
            ShardTuning::default(),
        )))
        .unwrap();
        assert_eq!(tuning, ShardTuning::default());
        assert_eq!(tuning.dispersion_max_us, 1_000_000);

        let tuning = ShardTuning::from_figment(
            Figment::from(Serialized::defaults(ShardTuning::default())).merge(Toml::string(
                "dispersion_max_us = 0\nserialize_predictions = true\nmetrics_listen = \"127.0.0.1:9000\"",
            )),
        )
        .unwrap();
        assert_eq!(tuning.dispersion_max_us, 0);
        assert!(tuning.serialize_predictions);
        assert_eq!(
            tuning.metrics_addr().unwrap(),
            Some("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn test_tuning_validation() {
        let rank_zero = Figment::from(Serialized::defaults(ShardTuning::default()))
            .merge(Toml::string("factorization_rank = 0"));
        assert!(ShardTuning::from_figment(rank_zero).is_err());

        let bad_metrics = Figment::from(Serialized::defaults(ShardTuning::default()))
            .merge(Toml::string("metrics_listen = \"nowhere\""));
        assert!(ShardTuning::from_figment(bad_metrics).is_err());
    }

    #[test]
    fn test_to_toml_roundtrips_through_figment() {
        let text = ShardTuning::default().to_toml().unwrap();
        let parsed = ShardTuning::from_figment(Figment::from(Toml::string(&text))).unwrap();
        assert_eq!(parsed, ShardTuning::default());
    }
}
