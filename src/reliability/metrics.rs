//! Prometheus metrics registration and export.

use std::net::SocketAddr;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::constants::metric_names::{
    DISPERSION_DELAY_US, PROBES_TOTAL, PROBE_UNAVAILABLE_TOTAL, REQUESTS_FAILED_TOTAL,
    REQUESTS_TOTAL, STAGE_DURATION_US,
};
use crate::error::{AppError, Result};

/// Register descriptions for every metric the shard emits.
pub fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of rating requests admitted");
    describe_counter!(
        REQUESTS_FAILED_TOTAL,
        "Requests answered with an in-band error, by kind"
    );
    describe_counter!(PROBES_TOTAL, "Requests carrying the utilization probe flag");
    describe_counter!(
        PROBE_UNAVAILABLE_TOTAL,
        "Probes answered without counters because they could not be read"
    );
    describe_histogram!(
        STAGE_DURATION_US,
        Unit::Microseconds,
        "Duration of the unpack, compute and pack stages"
    );
    describe_histogram!(
        DISPERSION_DELAY_US,
        Unit::Microseconds,
        "Busy-wait inserted before packing each response"
    );
}

/// Install the Prometheus recorder with an HTTP scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn install_prometheus(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| AppError::Internal(format!("failed to install Prometheus exporter: {}", e)))?;

    register_metrics();
    info!("Prometheus metrics exported on {}", listen);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_without_recorder_is_noop() {
        // With no recorder installed the describe calls are dropped silently.
        register_metrics();
    }
}
