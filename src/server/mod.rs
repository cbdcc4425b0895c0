//! gRPC serving pipeline.
//!
//! This module provides the wire contract, the per-request dispatcher and
//! the tonic binding for one compute shard.

/// Generated wire types and service stubs.
pub mod proto {
    tonic::include_proto!("collaborative_filtering");
}

pub mod codec;
pub mod dispatcher;
pub mod dispersion;
mod grpc;
mod metrics;

pub use dispatcher::{DispatchState, ShardService};
pub use dispersion::DispersionDelay;
pub use grpc::{serve, CfGrpcService};
pub use metrics::ShardStats;
