//! Host CPU time counters for load-aware routing.
//!
//! Counters come from the aggregate `cpu` line of `/proc/stat` and are
//! reported in clock ticks, exactly as the kernel exposes them.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::constants::telemetry::PROC_STAT_PATH;
use crate::error::TelemetryError;

/// Host-wide CPU time counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UtilizationSample {
    /// `user + nice`
    pub user_time: u64,
    /// `system + irq + softirq`
    pub system_time: u64,
    /// `iowait`
    pub io_time: u64,
    /// `idle`
    pub idle_time: u64,
}

impl UtilizationSample {
    /// Sum of all four counters, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.user_time
            .saturating_add(self.system_time)
            .saturating_add(self.io_time)
            .saturating_add(self.idle_time)
    }

    /// Parse the aggregate `cpu` line out of `/proc/stat` contents.
    pub fn parse_proc_stat(contents: &str) -> Result<Self, TelemetryError> {
        let line = contents
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| TelemetryError::Unavailable("no aggregate cpu line".to_string()))?;

        let fields = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TelemetryError::Unavailable(format!("bad cpu counter: {}", e)))?;
        if fields.len() < 4 {
            return Err(TelemetryError::Unavailable(format!(
                "expected at least 4 cpu counters, found {}",
                fields.len()
            )));
        }

        let at = |i: usize| fields.get(i).copied().unwrap_or(0);
        let fold = |indices: &[usize]| {
            indices
                .iter()
                .try_fold(0u64, |acc, &i| acc.checked_add(at(i)))
                .ok_or_else(|| TelemetryError::Unavailable("cpu counters overflow u64".to_string()))
        };
        Ok(Self {
            user_time: fold(&[0, 1])?,
            system_time: fold(&[2, 5, 6])?,
            io_time: at(4),
            idle_time: at(3),
        })
    }
}

/// Percentage of non-idle time between two samples.
///
/// `None` when no ticks elapsed or the counters went backwards, instead of
/// producing a division by zero.
pub fn utilization_percent(start: &UtilizationSample, end: &UtilizationSample) -> Option<f32> {
    let total = end.total().checked_sub(start.total())?;
    let idle = end.idle_time.checked_sub(start.idle_time)?;
    if total == 0 || idle > total {
        return None;
    }
    Some((100.0 * (1.0 - idle as f64 / total as f64)) as f32)
}

/// Reads host CPU counters at the moment of the call.
pub trait CpuTimeSampler: Send + Sync {
    fn sample(&self) -> Result<UtilizationSample, TelemetryError>;
}

/// Sampler backed by a procfs `stat` file.
#[derive(Debug, Clone)]
pub struct ProcStatSampler {
    path: PathBuf,
}

impl ProcStatSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new(PROC_STAT_PATH)
    }
}

impl CpuTimeSampler for ProcStatSampler {
    fn sample(&self) -> Result<UtilizationSample, TelemetryError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            TelemetryError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        UtilizationSample::parse_proc_stat(&contents)
    }
}

/// Answers utilization probes. A failed read downgrades to "absent".
#[derive(Clone)]
pub struct UtilizationReporter {
    sampler: Arc<dyn CpuTimeSampler>,
}

impl UtilizationReporter {
    pub fn new(sampler: Arc<dyn CpuTimeSampler>) -> Self {
        Self { sampler }
    }

    /// Sample now; `None` if the counters are unavailable.
    pub fn report(&self) -> Option<UtilizationSample> {
        match self.sampler.sample() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("Utilization probe reported absent: {}", e);
                None
            }
        }
    }
}
