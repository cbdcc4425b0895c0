//! Operational concerns: logging, metrics export and shutdown handling.

pub mod graceful_shutdown;
pub mod metrics;
pub mod tracing;

pub use graceful_shutdown::GracefulShutdown;
pub use metrics::{install_prometheus, register_metrics};
pub use self::tracing::{init_tracing, TracingConfig};
