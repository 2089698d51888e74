//! HTTP resource outcome storage.
//!
//! Outcomes are keyed by resource kind and cache identity. Rows are never
//! rewritten; once a successful outcome exists for an identity no further
//! rows are added for it.

use std::collections::BTreeMap;

use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection};

use super::connection::CacheDb;
use super::{now_timestamp, parse_timestamp};
use crate::Error;
use crate::resource::{CacheIdentity, NewResource, ResourceRecord};

struct ResourceRow {
    id: i64,
    kind: String,
    uri: String,
    data_hash: String,
    config_json: String,
    request_json: String,
    head_json: String,
    body: String,
    status: u16,
    created_at: String,
}

impl ResourceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            uri: row.get(2)?,
            data_hash: row.get(3)?,
            config_json: row.get(4)?,
            request_json: row.get(5)?,
            head_json: row.get(6)?,
            body: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<ResourceRecord, Error> {
        Ok(ResourceRecord {
            id: self.id,
            kind: self.kind,
            identity: CacheIdentity { uri: self.uri, data_hash: self.data_hash },
            config: serde_json::from_str(&self.config_json)?,
            request: serde_json::from_str(&self.request_json)?,
            head: serde_json::from_str::<BTreeMap<String, String>>(&self.head_json)?,
            body: self.body,
            status: self.status,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

const RESOURCE_COLUMNS: &str =
    "id, kind, uri, data_hash, config_json, request_json, head_json, body, status, created_at";

/// Latest row for an identity, optionally restricted to the success band.
fn latest_row(
    conn: &Connection, kind: &str, identity: &CacheIdentity, successful_only: bool,
) -> Result<Option<ResourceRecord>, Error> {
    let band = if successful_only { "AND status >= 200 AND status < 209" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESOURCE_COLUMNS} FROM http_resources
         WHERE kind = ?1 AND uri = ?2 AND data_hash = ?3 {band}
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))?;

    match stmt.query_row(params![kind, identity.uri, identity.data_hash], ResourceRow::from_row) {
        Ok(row) => Ok(Some(row.into_record()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn insert_row(conn: &Connection, resource: NewResource) -> Result<ResourceRecord, Error> {
    let config_json = serde_json::to_string(&resource.config)?;
    let request_json = serde_json::to_string(&resource.request)?;
    let head_json = serde_json::to_string(&resource.head)?;
    let created_at = now_timestamp();

    conn.execute(
        "INSERT INTO http_resources (
            kind, uri, data_hash, config_json, request_json, head_json, body, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &resource.kind,
            &resource.identity.uri,
            &resource.identity.data_hash,
            config_json,
            request_json,
            head_json,
            &resource.body,
            resource.status,
            created_at,
        ],
    )?;

    Ok(ResourceRecord {
        id: conn.last_insert_rowid(),
        kind: resource.kind,
        identity: resource.identity,
        config: resource.config,
        request: resource.request,
        head: resource.head,
        body: resource.body,
        status: resource.status,
        created_at: parse_timestamp(&created_at)?,
    })
}

impl CacheDb {
    /// Get the most recent outcome for an identity, successful or not.
    pub async fn latest_resource(&self, kind: &str, identity: &CacheIdentity) -> Result<Option<ResourceRecord>, Error> {
        let kind = kind.to_string();
        let identity = identity.clone();
        self.call(move |conn| latest_row(conn, &kind, &identity, false)).await
    }

    /// Get the most recent successful outcome for an identity.
    pub async fn successful_resource(
        &self, kind: &str, identity: &CacheIdentity,
    ) -> Result<Option<ResourceRecord>, Error> {
        let kind = kind.to_string();
        let identity = identity.clone();
        self.call(move |conn| latest_row(conn, &kind, &identity, true)).await
    }

    /// Persist a fetch outcome.
    ///
    /// When a successful outcome for the same identity was stored in the
    /// meantime, that record is returned instead and nothing is inserted.
    /// The flag tells whether a row was inserted.
    pub async fn record_resource(&self, resource: NewResource) -> Result<(ResourceRecord, bool), Error> {
        let (record, inserted) = self
            .write(move |tx| -> Result<(ResourceRecord, bool), Error> {
                if let Some(existing) = latest_row(tx, &resource.kind, &resource.identity, true)? {
                    return Ok((existing, false));
                }
                Ok((insert_row(tx, resource)?, true))
            })
            .await?;

        if inserted {
            tracing::info!(kind = %record.kind, id = record.id, identity = %record.identity, status = record.status, "stored resource");
        } else {
            tracing::debug!(kind = %record.kind, id = record.id, identity = %record.identity, "resource already stored");
        }
        Ok((record, inserted))
    }

    /// Get a resource outcome by id.
    pub async fn get_resource(&self, id: i64) -> Result<ResourceRecord, Error> {
        self.call(move |conn| -> Result<Option<ResourceRecord>, Error> {
            let mut stmt = conn.prepare(&format!("SELECT {RESOURCE_COLUMNS} FROM http_resources WHERE id = ?1"))?;
            match stmt.query_row(params![id], ResourceRow::from_row) {
                Ok(row) => Ok(Some(row.into_record()?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
        .ok_or_else(|| Error::NotFound(format!("resource {id}")))
    }

    /// Number of stored outcomes for an identity.
    pub async fn count_resources(&self, kind: &str, identity: &CacheIdentity) -> Result<u64, Error> {
        let kind = kind.to_string();
        let identity = identity.clone();
        self.call(move |conn| -> Result<u64, Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM http_resources WHERE kind = ?1 AND uri = ?2 AND data_hash = ?3",
                params![kind, identity.uri, identity.data_hash],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}
