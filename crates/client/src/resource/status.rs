//! Classification of response statuses.

use rescache_core::{Error, ResourceRecord};

/// What a response status means for the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `[200, 209)`
    Success,
    /// `[400, 500)`
    ClientError,
    /// `>= 500`
    ServerError,
    /// Anything else: informational, redirects and the rest of 2xx/3xx.
    Incomplete,
}

impl Outcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=208 => Outcome::Success,
            400..=499 => Outcome::ClientError,
            500.. => Outcome::ServerError,
            _ => Outcome::Incomplete,
        }
    }

    /// Whether a new attempt at the same request could have a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::ServerError)
    }
}

/// Turn 4xx and 5xx records into errors; every other record passes through.
pub fn raise_for_status(record: ResourceRecord) -> Result<ResourceRecord, Error> {
    match Outcome::from_status(record.status) {
        Outcome::Success => Ok(record),
        Outcome::Incomplete => {
            tracing::debug!(kind = %record.kind, id = record.id, status = record.status, "incomplete response");
            Ok(record)
        }
        Outcome::ClientError => {
            tracing::warn!(kind = %record.kind, id = record.id, status = record.status, "client error");
            Err(Error::ClientError(Box::new(record)))
        }
        Outcome::ServerError => {
            tracing::warn!(kind = %record.kind, id = record.id, status = record.status, "server error");
            Err(Error::ServerError(Box::new(record)))
        }
    }
}
