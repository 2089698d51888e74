//! SQLite-backed store for entity records and HTTP resource outcomes.
//!
//! This module provides a persistent, append-only store using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Signature-keyed entities with lookup, lookup-or-create and create
//! - Content-addressed HTTP resources keyed by canonical URI and body hash
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entities;
pub mod hash;
pub mod migrations;
pub mod resources;
pub mod signature;

use chrono::{DateTime, SecondsFormat, Utc};

pub use crate::Error;

pub use connection::CacheDb;
pub use entities::{Entity, EntityType};
pub use hash::compute_data_hash;
pub use signature::{signature, signature_from_input};

/// Current time in the fixed-width form stored in `created_at` columns,
/// so that text order matches time order.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp {value}: {e}")))
}
