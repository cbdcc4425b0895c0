//! Logging setup.
//!
//! Structured logs through `tracing-subscriber`; `RUST_LOG` overrides the
//! configured level.

use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry};

/// Configuration for logging.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup record.
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "cf-shard-server".to_string(),
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let subscriber = Registry::default().with(env_filter);

    if config.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()?;
    }

    info!("Logging initialised for {}", config.service_name);
    Ok(())
}

/// Create a span for one shard request.
///
/// Identifier fields start empty and are recorded once the request is unpacked.
#[macro_export]
macro_rules! request_span {
    ($request_id:expr) => {
        tracing::debug_span!(
            "cf_request",
            request_id = $request_id,
            user_id = tracing::field::Empty,
            item_id = tracing::field::Empty,
            probe = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    };
}
