//! Custom error types for the cf-shard-server.
//!
//! Request-scoped failures ([`RequestError`]) never escape a handler: they are
//! folded into the response envelope. Everything else is a startup failure and
//! surfaces through [`AppError`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::server::proto;

/// Which side of the rating matrix an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Item,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::User => f.write_str("user"),
            EntityKind::Item => f.write_str("item"),
        }
    }
}

/// Errors that terminate a single request but never the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Missing or invalid identifier fields; raised before any model access.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Identifier outside the trained model's range.
    #[error("Unknown {entity} {id} (trained range 0..{bound})")]
    UnknownEntity {
        entity: EntityKind,
        id: u32,
        bound: u32,
    },

    /// The engine produced something that cannot be returned as a rating.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RequestError::MalformedRequest(_) => "malformed_request",
            RequestError::UnknownEntity { .. } => "unknown_entity",
            RequestError::Internal(_) => "internal",
        }
    }
}

/// Conversion into the in-band error carried by the response envelope.
impl From<&RequestError> for proto::CfError {
    fn from(err: &RequestError) -> Self {
        let kind = match err {
            RequestError::MalformedRequest(_) => proto::ErrorKind::MalformedRequest,
            RequestError::UnknownEntity { .. } => proto::ErrorKind::UnknownEntity,
            RequestError::Internal(_) => proto::ErrorKind::Internal,
        };

        proto::CfError {
            kind: kind as i32,
            message: err.to_string(),
        }
    }
}

/// Host CPU counters could not be read. Always non-fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    #[error("CPU counters unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while loading the training dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("truncated binary record at byte offset {offset}")]
    TruncatedRecord { offset: usize },

    #[error("non-finite rating for user {user}, item {item}")]
    NonFiniteRating { user: u32, item: u32 },

    #[error("identifier {0} exceeds the supported range")]
    IdentifierOverflow(u32),

    #[error("dataset contains no ratings")]
    Empty,
}

/// Errors from invalid configuration or arguments.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("{0}")]
    Validation(String),

    #[error("cannot listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Primary error type for startup and serving failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad arguments or tunables.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Unreadable or malformed dataset.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Factorization could not produce a usable model.
    #[error("Model error: {0}")]
    Model(String),

    /// Listen address could not be bound or the server failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal server errors.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to the error.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to the error.
    fn with_static_context(self, context: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", f(), e)))
    }

    fn with_static_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }
}
