//! The `cf_shard_server` core library.
//!
//! One compute shard of a sharded recommendation tier: it answers
//! rating-prediction RPCs from a read-only factorized model and piggybacks
//! stage timings and host CPU counters for the upstream router.

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod reliability;
pub mod server;
pub mod telemetry;
pub mod types;
