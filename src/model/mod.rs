//! Rating model lifecycle: dataset loading, factorization, prediction.
//!
//! The model is built exactly once at startup and then shared read-only.

pub mod dataset;
pub mod engine;
pub mod factorizer;

pub use dataset::{Dataset, DatasetFormat, Rating};
pub use engine::{RatingEngine, SerializedEngine};
pub use factorizer::{factorize, FactorizationParams, FactorizedModel};
