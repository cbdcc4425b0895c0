//! In-process request statistics.
//!
//! Cheap atomic counters kept alongside the exported metrics so the shard
//! can report a summary without a scrape endpoint.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Tracks request counts and concurrency for one shard.
#[derive(Debug)]
pub struct ShardStats {
    /// Total number of requests admitted
    total_requests: AtomicU64,

    /// Requests answered with an in-band error
    failed_requests: AtomicU64,

    /// Requests carrying the utilization probe flag
    probes: AtomicU64,

    /// Probes whose counters could not be read
    probes_unavailable: AtomicU64,

    /// Requests currently in the pipeline
    in_flight: AtomicU32,

    /// Highest concurrency observed
    peak_in_flight: AtomicU32,

    /// Server start time
    start_time: Instant,
}

impl ShardStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            probes_unavailable: AtomicU64::new(0),
            in_flight: AtomicU32::new(0),
            peak_in_flight: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// A request entered the pipeline.
    pub fn request_started(&self) {
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.peak_in_flight.fetch_max(active, Ordering::SeqCst);
    }

    /// A request left the pipeline.
    pub fn request_finished(&self, failed: bool) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if failed {
            self.failed_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_probe(&self, available: bool) {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !available {
            self.probes_unavailable.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> u32 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Get all statistics as a serde_json::Value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_seconds": self.start_time.elapsed().as_secs(),
            "total_requests": self.total_requests.load(Ordering::SeqCst),
            "failed_requests": self.failed_requests.load(Ordering::SeqCst),
            "probes": self.probes.load(Ordering::SeqCst),
            "probes_unavailable": self.probes_unavailable.load(Ordering::SeqCst),
            "in_flight": self.in_flight.load(Ordering::SeqCst),
            "peak_in_flight": self.peak_in_flight.load(Ordering::SeqCst),
        })
    }
}

impl Default for ShardStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_peak() {
        let stats = ShardStats::new();
        stats.request_started();
        stats.request_started();
        stats.request_finished(false);
        stats.request_finished(true);
        stats.record_probe(true);
        stats.record_probe(false);

        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.failed_requests(), 1);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.peak_in_flight(), 2);

        let json = stats.to_json();
        assert_eq!(json["probes"], 2);
        assert_eq!(json["probes_unavailable"], 1);
    }
}
