//! Domain constants for the shard server.
//!
//! Compile-time values are kept here; anything an operator may want to tune
//! also has a field in [`crate::config::ShardTuning`] that defaults to these.

/// Dispersion delay constants.
pub mod dispersion {
    /// Exclusive upper bound of the randomized busy-wait, in microseconds.
    pub const DEFAULT_MAX_DELAY_US: u64 = 1_000_000;
}

/// Factorization defaults.
pub mod factorization {
    /// Latent rank of the user and item factors.
    pub const DEFAULT_RANK: usize = 5;

    /// Number of alternating update sweeps.
    pub const DEFAULT_ITERATIONS: usize = 50;

    /// Seed for the factor initialisation.
    pub const DEFAULT_SEED: u64 = 0x5EED_CF01;

    /// Added to every denominator of the multiplicative update.
    pub const EPSILON: f32 = 1e-9;

    /// Upper bound on `(users + items) × rank`; 4 GiB of `f32` factors.
    pub const MAX_FACTOR_CELLS: usize = 1 << 30;
}

/// Host telemetry constants.
pub mod telemetry {
    /// Source of the host-wide CPU time counters.
    pub const PROC_STAT_PATH: &str = "/proc/stat";
}

/// Command-line contract.
pub mod cli {
    /// Core-count argument meaning "use every core on the host".
    pub const ALL_CORES: i32 = -1;

    /// Dataset mode: whitespace or comma separated text triples.
    pub const MODE_TEXT: u8 = 1;

    /// Dataset mode: packed little-endian binary records.
    pub const MODE_BINARY: u8 = 2;
}

/// Server runtime constants.
pub mod runtime {
    /// Default size of tokio's blocking pool, where requests execute.
    pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;

    /// Files consulted for tunables, lowest precedence first.
    pub const CONFIG_TOML: &str = "cf_shard.toml";
    pub const CONFIG_YAML: &str = "cf_shard.yaml";

    /// Prefix of tunable environment variables.
    pub const ENV_PREFIX: &str = "CF_SHARD_";
}

/// Metric names.
pub mod metric_names {
    pub const REQUESTS_TOTAL: &str = "cf_requests_total";
    pub const REQUESTS_FAILED_TOTAL: &str = "cf_requests_failed_total";
    pub const PROBES_TOTAL: &str = "cf_probes_total";
    pub const PROBE_UNAVAILABLE_TOTAL: &str = "cf_probe_unavailable_total";
    pub const STAGE_DURATION_US: &str = "cf_stage_duration_us";
    pub const DISPERSION_DELAY_US: &str = "cf_dispersion_delay_us";
}
