//! Collaborative-filtering shard server.
//!
//! Usage: `cf-shard-server <dataset> <host:port> <mode> <cores> <shard index> <shard count>`

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};

use cf_shard_server::{
    bootstrap::initialize_shard,
    config::{startup_diagnostic, Config, ShardArgs},
    error::{AppError, ConfigError, ErrorContext, Result},
    reliability::{init_tracing, install_prometheus, GracefulShutdown, TracingConfig},
    server::serve,
};

fn main() {
    let args = ShardArgs::parse();

    if let Err(e) = run(args) {
        eprintln!("{}", startup_diagnostic(&e));
        std::process::exit(1);
    }
}

fn run(args: ShardArgs) -> Result<()> {
    let config = Config::load(args)?;

    init_tracing(&TracingConfig {
        log_level: config.tuning.log_level.clone(),
        json: config.tuning.log_json,
        ..Default::default()
    })
    .map_err(|e| AppError::Internal(format!("failed to initialise logging: {}", e)))?;
    debug!("Effective tunables:\n{}", config.tuning.to_toml()?);

    let worker_threads = config.args.worker_threads(num_cpus::get());
    info!(
        "Using {} worker threads, up to {} blocking request threads",
        worker_threads, config.tuning.max_blocking_threads
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(config.tuning.max_blocking_threads)
        .enable_all()
        .build()
        .with_static_context("failed to build runtime")?;

    runtime.block_on(serve_shard(config))
}

async fn serve_shard(config: Config) -> Result<()> {
    if let Some(addr) = config.tuning.metrics_addr()? {
        install_prometheus(addr)?;
    }

    // The model is fully built before the listener exists.
    let service = Arc::new(initialize_shard(&config)?);
    let stats = Arc::clone(service.stats());

    let listener = TcpListener::bind(&config.args.listen)
        .await
        .map_err(|source| ConfigError::Listen {
            addr: config.args.listen.clone(),
            source,
        })?;

    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_signals();

    serve(listener, service, shutdown.wait()).await?;

    info!("Final request statistics: {}", stats.to_json());
    Ok(())
}
