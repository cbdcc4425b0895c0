//! Measurement primitives: clock, stage timing and host CPU counters.

pub mod clock;
pub mod cpu;
pub mod timing;

pub use clock::{MonotonicClock, TimeSource};
pub use cpu::{
    utilization_percent, CpuTimeSampler, ProcStatSampler, UtilizationReporter, UtilizationSample,
};
pub use timing::{measure, Stage, TimingRecord};
