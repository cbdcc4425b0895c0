//! Per-request stage timing.

use crate::telemetry::clock::TimeSource;

/// Instrumented pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Unpack,
    Compute,
    Pack,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Unpack => "unpack",
            Stage::Compute => "compute",
            Stage::Pack => "pack",
        }
    }
}

/// Elapsed microseconds per stage for one request. Never shared.
///
/// The dispersion delay is deliberately not attributed to any stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingRecord {
    pub unpack_us: u64,
    pub compute_us: u64,
    pub pack_us: u64,
    /// Host utilization over the request, when a delta could be computed.
    pub cpu_util_percent: Option<f32>,
}

impl TimingRecord {
    pub fn record(&mut self, stage: Stage, elapsed_us: u64) {
        match stage {
            Stage::Unpack => self.unpack_us = elapsed_us,
            Stage::Compute => self.compute_us = elapsed_us,
            Stage::Pack => self.pack_us = elapsed_us,
        }
    }

    pub fn get(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Unpack => self.unpack_us,
            Stage::Compute => self.compute_us,
            Stage::Pack => self.pack_us,
        }
    }

    /// Sum of the named stages.
    pub fn total_us(&self) -> u64 {
        self.unpack_us + self.compute_us + self.pack_us
    }
}

/// Run `f` bracketed by two clock reads and return its output with the
/// elapsed microseconds.
pub fn measure<T>(clock: &dyn TimeSource, f: impl FnOnce() -> T) -> (T, u64) {
    let start = clock.now_micros();
    let out = f();
    let end = clock.now_micros();
    (out, end.saturating_sub(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Advances by a fixed step on every read.
    struct SteppingClock {
        now: AtomicU64,
        step: u64,
    }

    impl TimeSource for SteppingClock {
        fn now_micros(&self) -> u64 {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    #[test]
    fn test_measure_uses_clock_delta() {
        let clock = SteppingClock { now: AtomicU64::new(100), step: 7 };
        let (value, elapsed) = measure(&clock, || 42);

        assert_eq!(value, 42);
        assert_eq!(elapsed, 7);
    }

    #[test]
    fn test_record_and_total() {
        let mut timing = TimingRecord::default();
        timing.record(Stage::Unpack, 3);
        timing.record(Stage::Compute, 10);
        timing.record(Stage::Pack, 2);

        assert_eq!(timing.get(Stage::Compute), 10);
        assert_eq!(timing.total_us(), 15);
        assert_eq!(Stage::Pack.as_str(), "pack");
    }
}
