//! Unified error types for rescache.
//!
//! Variants double as the retry taxonomy handed to whatever orchestrates
//! fetches: only `ServerError`, `Transport` and `Timeout` are worth re-driving.

use tokio_rusqlite::rusqlite;

use crate::resource::ResourceRecord;

/// Unified error type for the cache and fetch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or disallowed input, detected before any network call.
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),

    /// A constant configuration option that the type does not declare.
    #[error("INVALID_CONFIG: {0}")]
    InvalidConfig(String),

    /// Pure lookup found no record.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Connection-level failure while talking to the remote host.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// The remote answered with a 4xx status. The persisted record is attached.
    #[error("HTTP_4XX: {} > {} \n\n {}", .0.kind, .0.status, .0.body)]
    ClientError(Box<ResourceRecord>),

    /// The remote answered with a 5xx status. The persisted record is attached.
    #[error("HTTP_5XX: {} > {} \n\n {}", .0.kind, .0.status, .0.body)]
    ServerError(Box<ResourceRecord>),

    /// A network or store deadline expired.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored JSON could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether an orchestrator may re-drive the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ServerError(_) | Error::Transport(_) | Error::Timeout(_))
    }

    /// The persisted response record behind an HTTP error, if any.
    pub fn record(&self) -> Option<&ResourceRecord> {
        match self {
            Error::ClientError(record) | Error::ServerError(record) => Some(record),
            _ => None,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
