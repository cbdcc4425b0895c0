//! Router-like client for a running shard.
//!
//! Issues a burst of concurrent rating requests, marking every K-th one as a
//! utilization probe, and prints what comes back.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tonic::transport::Channel;
use tracing::{info, warn};

use cf_shard_server::server::proto::cf_service_client::CfServiceClient;
use cf_shard_server::server::proto::{CfRequest, CfResponse, UtilRequest};

#[derive(Parser, Debug)]
#[command(name = "cf-probe-client", about = "Send rating and probe requests to a shard")]
struct ProbeArgs {
    /// Shard address, `host:port`
    target: String,

    /// Number of concurrent requests
    #[arg(long, default_value_t = 8)]
    count: u64,

    /// Mark every K-th request as a utilization probe (0 disables probes)
    #[arg(long, default_value_t = 4)]
    probe_every: u64,

    /// User to rate for
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    user: i64,

    /// Item to rate
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    item: i64,

    /// Print one JSON object per response
    #[arg(long)]
    json: bool,
}

fn build_request(args: &ProbeArgs, request_id: u64) -> CfRequest {
    let probe = args.probe_every > 0 && request_id % args.probe_every == 0;
    CfRequest {
        request_id,
        user_id: Some(args.user),
        item_id: Some(args.item),
        util_request: Some(UtilRequest { util_request: probe }),
    }
}

fn describe(response: &CfResponse) -> serde_json::Value {
    let timing = response.timing_data_in_micro.clone().unwrap_or_default();
    let util = response
        .util_response
        .clone()
        .filter(|u| u.util_present)
        .map(|u| {
            serde_json::json!({
                "user": u.user_time,
                "system": u.system_time,
                "io": u.io_time,
                "idle": u.idle_time,
            })
        });

    serde_json::json!({
        "request_id": response.request_id,
        "rating": response.rating,
        "error": response.error.as_ref().map(|e| e.message.clone()),
        "unpack_us": timing.unpack_us,
        "compute_us": timing.compute_us,
        "pack_us": timing.pack_us,
        "cpu_util_percent": timing.cpu_util_percent,
        "utilization": util,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = ProbeArgs::parse();
    let endpoint = format!("http://{}", args.target);
    let channel = Channel::from_shared(endpoint.clone())
        .with_context(|| format!("invalid shard address {}", args.target))?
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}", endpoint))?;
    let client = CfServiceClient::new(channel);

    let started = Instant::now();
    let calls = (1..=args.count).map(|id| {
        let mut client = client.clone();
        let request = build_request(&args, id);
        async move { client.cf(request).await }
    });
    let results = join_all(calls).await;
    let elapsed = started.elapsed();

    let mut answered = 0usize;
    for result in results {
        match result {
            Ok(response) => {
                answered += 1;
                let summary = describe(response.get_ref());
                if args.json {
                    println!("{}", summary);
                } else {
                    println!(
                        "#{} rating={} timing={}/{}/{}us util={}",
                        summary["request_id"],
                        summary["rating"],
                        summary["unpack_us"],
                        summary["compute_us"],
                        summary["pack_us"],
                        summary["utilization"],
                    );
                }
            }
            Err(status) => warn!("Request failed at transport level: {}", status),
        }
    }

    info!(
        "{} of {} requests answered in {:.2?}",
        answered, args.count, elapsed
    );
    Ok(())
}
