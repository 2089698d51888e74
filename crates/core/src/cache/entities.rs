//! Entity records keyed by signature.
//!
//! Three lookup semantics are offered: pure lookup, lookup-or-create and
//! always-create. Lookups return the most recently created record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection};

use super::connection::CacheDb;
use super::signature::{signature, signature_from_input};
use super::{now_timestamp, parse_timestamp};
use crate::Error;
use crate::options::{ConfigDefaults, Configuration};

/// A kind of entity together with the options it declares.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub defaults: ConfigDefaults,
}

impl EntityType {
    pub fn new(name: impl Into<String>, defaults: ConfigDefaults) -> Self {
        Self { name: name.into(), defaults }
    }

    /// Signature for `context` and the constant options of `config`.
    pub fn signature(&self, context: &str, config: &Map<String, Value>) -> Result<String, Error> {
        signature(context, &self.defaults, config)
    }

    /// Signature for raw caller input; undeclared options are dropped.
    pub fn signature_from_input(&self, context: &str, input: &Map<String, Value>) -> String {
        signature_from_input(context, &self.defaults, input)
    }
}

/// A persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub kind: String,
    pub signature: String,
    pub config: Configuration,
    pub state: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

struct EntityRow {
    id: i64,
    kind: String,
    signature: String,
    config_json: String,
    state_json: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            signature: row.get(2)?,
            config_json: row.get(3)?,
            state_json: row.get(4)?,
            created_at: row.get(5)?,
            completed_at: row.get(6)?,
        })
    }

    fn into_entity(self) -> Result<Entity, Error> {
        Ok(Entity {
            id: self.id,
            kind: self.kind,
            signature: self.signature,
            config: Configuration::from_map(serde_json::from_str(&self.config_json)?),
            state: self.state_json.as_deref().map(serde_json::from_str::<Value>).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

const ENTITY_COLUMNS: &str = "id, kind, signature, config_json, state_json, created_at, completed_at";

fn latest_entity(conn: &Connection, kind: &str, signature: &str) -> Result<Option<Entity>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTITY_COLUMNS} FROM entities
         WHERE kind = ?1 AND signature = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))?;

    match stmt.query_row(params![kind, signature], EntityRow::from_row) {
        Ok(row) => Ok(Some(row.into_entity()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn entity_by_id(conn: &Connection, id: i64) -> Result<Option<Entity>, Error> {
    let mut stmt = conn.prepare(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"))?;

    match stmt.query_row(params![id], EntityRow::from_row) {
        Ok(row) => Ok(Some(row.into_entity()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn insert_entity(conn: &Connection, kind: &str, signature: &str, config: &Configuration) -> Result<Entity, Error> {
    let config_json = serde_json::to_string(config)?;
    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO entities (kind, signature, config_json, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![kind, signature, config_json, created_at],
    )?;

    Ok(Entity {
        id: conn.last_insert_rowid(),
        kind: kind.to_string(),
        signature: signature.to_string(),
        config: config.clone(),
        state: None,
        created_at: parse_timestamp(&created_at)?,
        completed_at: None,
    })
}

impl CacheDb {
    /// Get the most recently created entity with `signature`.
    ///
    /// Variable options in `config` are applied to the returned
    /// configuration; the stored record is not changed.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no entity carries the signature.
    pub async fn get_latest_by_signature(
        &self, kind: &EntityType, signature: &str, config: &Map<String, Value>,
    ) -> Result<Entity, Error> {
        let name = kind.name.clone();
        let sig = signature.to_string();
        let mut entity = self
            .call(move |conn| latest_entity(conn, &name, &sig))
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} with signature {signature}", kind.name)))?;

        entity.config.overlay_variables(config);
        Ok(entity)
    }

    /// Get the latest entity with `signature`, creating one when none exists.
    ///
    /// Lookup and insert share one immediate transaction, so concurrent
    /// callers for the same signature end up with the same record.
    pub async fn get_latest_or_create_by_signature(
        &self, kind: &EntityType, signature: &str, config: &Map<String, Value>,
    ) -> Result<(Entity, bool), Error> {
        let name = kind.name.clone();
        let sig = signature.to_string();
        let fresh = Configuration::from_input(&kind.defaults, config);

        let (mut entity, created) = self
            .write(move |tx| -> Result<(Entity, bool), Error> {
                if let Some(existing) = latest_entity(tx, &name, &sig)? {
                    return Ok((existing, false));
                }
                Ok((insert_entity(tx, &name, &sig, &fresh)?, true))
            })
            .await?;

        if created {
            tracing::info!(kind = %entity.kind, id = entity.id, signature = %entity.signature, "created entity");
        } else {
            entity.config.overlay_variables(config);
        }
        Ok((entity, created))
    }

    /// Create a new entity, even if others already carry `signature`.
    pub async fn create_by_signature(
        &self, kind: &EntityType, signature: &str, config: &Map<String, Value>,
    ) -> Result<Entity, Error> {
        let name = kind.name.clone();
        let sig = signature.to_string();
        let fresh = Configuration::from_input(&kind.defaults, config);

        let entity = self.write(move |tx| insert_entity(tx, &name, &sig, &fresh)).await?;
        tracing::info!(kind = %entity.kind, id = entity.id, signature = %entity.signature, "created entity");
        Ok(entity)
    }

    /// Number of entities of `kind` sharing `signature`.
    pub async fn count_by_signature(&self, kind: &EntityType, signature: &str) -> Result<u64, Error> {
        let name = kind.name.clone();
        let sig = signature.to_string();
        self.call(move |conn| -> Result<u64, Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE kind = ?1 AND signature = ?2",
                params![name, sig],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Get an entity by id.
    pub async fn get_entity(&self, id: i64) -> Result<Entity, Error> {
        self.call(move |conn| entity_by_id(conn, id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("entity {id}")))
    }

    /// Record the final state of an entity.
    ///
    /// An entity completes exactly once; later attempts fail with
    /// `Error::Validation`.
    pub async fn complete_entity(&self, id: i64, state: Value) -> Result<Entity, Error> {
        let state_json = serde_json::to_string(&state)?;
        self.write(move |tx| -> Result<Entity, Error> {
            let updated = tx.execute(
                "UPDATE entities SET state_json = ?1, completed_at = ?2
                 WHERE id = ?3 AND completed_at IS NULL",
                params![state_json, now_timestamp(), id],
            )?;
            let entity = entity_by_id(tx, id)?.ok_or_else(|| Error::NotFound(format!("entity {id}")))?;
            if updated == 0 {
                return Err(Error::Validation(format!("entity {id} is already complete")));
            }
            Ok(entity)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn community() -> EntityType {
        EntityType::new("CommunityMock", ConfigDefaults::new().with("setting1", "default").with("setting3", 3))
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_get_latest_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let input = config(json!({"setting1": "variable"}));
        let sig = kind.signature("test", &input).unwrap();

        let result = db.get_latest_by_signature(&kind, &sig, &input).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_latest_returns_newest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let input = config(json!({"$setting2": "variable"}));
        let sig = kind.signature("test-multiple", &input).unwrap();

        let first = db.create_by_signature(&kind, &sig, &input).await.unwrap();
        let latest = db.get_latest_by_signature(&kind, &sig, &input).await.unwrap();
        assert_eq!(latest.id, first.id);

        let second = db.create_by_signature(&kind, &sig, &input).await.unwrap();
        let latest = db.get_latest_by_signature(&kind, &sig, &input).await.unwrap();
        assert_eq!(latest.id, second.id);
        assert!(latest.created_at >= first.created_at);
        assert_eq!(latest.config.get_str("$setting2"), Some("variable"));
    }

    #[tokio::test]
    async fn test_get_latest_applies_variable_options() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let sig = kind.signature("test", &Map::new()).unwrap();
        db.create_by_signature(&kind, &sig, &Map::new()).await.unwrap();

        let entity = db
            .get_latest_by_signature(&kind, &sig, &config(json!({"$setting2": "variable"})))
            .await
            .unwrap();
        assert_eq!(entity.config.get_str("$setting2"), Some("variable"));
    }

    #[tokio::test]
    async fn test_get_latest_or_create_existing_keeps_constants() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let constant = config(json!({"setting1": "const"}));
        let sig = kind.signature("test", &constant).unwrap();

        let (first, created) = db.get_latest_or_create_by_signature(&kind, &sig, &constant).await.unwrap();
        assert!(created);
        assert_eq!(first.config.get_str("setting1"), Some("const"));

        let (again, created) = db
            .get_latest_or_create_by_signature(&kind, &sig, &config(json!({"setting1": "created"})))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.config.get_str("setting1"), Some("const"));
    }

    #[tokio::test]
    async fn test_get_latest_or_create_drops_illegal_keys() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let sig = kind.signature("test", &config(json!({"setting1": "const"}))).unwrap();
        let input = config(json!({"setting1": "const", "illegal": "please"}));

        let (entity, created) = db.get_latest_or_create_by_signature(&kind, &sig, &input).await.unwrap();
        assert!(created);
        assert!(!entity.config.contains("illegal"));
        assert_eq!(entity.config.get("setting3"), Some(&json!(3)));

        let stored = db.get_entity(entity.id).await.unwrap();
        assert!(!stored.config.contains("illegal"));
    }

    #[tokio::test]
    async fn test_illegal_input_matches_legal_signature() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let input = config(json!({"setting1": "const", "illegal": "please"}));
        let sig = kind.signature_from_input("test", &input);
        assert_eq!(sig, kind.signature("test", &config(json!({"setting1": "const"}))).unwrap());

        let (entity, created) = db.get_latest_or_create_by_signature(&kind, &sig, &input).await.unwrap();
        assert!(created);
        assert_eq!(entity.signature, "test&setting1=const");
        assert!(!entity.config.contains("illegal"));
    }

    #[tokio::test]
    async fn test_create_by_signature_duplicates() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let constant = config(json!({"setting1": "const"}));
        let sig = kind.signature("test", &constant).unwrap();

        let a = db.create_by_signature(&kind, &sig, &constant).await.unwrap();
        let b = db.create_by_signature(&kind, &sig, &constant).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.config.get_str("setting1"), Some("const"));
        assert_eq!(db.count_by_signature(&kind, &sig).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_converges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let mut handles_db = Vec::new();
        for _ in 0..4 {
            handles_db.push(CacheDb::open(&path).await.unwrap());
        }
        let kind = community();
        let constant = config(json!({"setting1": "race"}));
        let sig = kind.signature("test", &constant).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = handles_db[i % handles_db.len()].clone();
            let kind = kind.clone();
            let sig = sig.clone();
            let constant = constant.clone();
            handles.push(tokio::spawn(async move {
                db.get_latest_or_create_by_signature(&kind, &sig, &constant).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut creations = 0;
        for handle in handles {
            let (entity, created) = handle.await.unwrap();
            ids.push(entity.id);
            if created {
                creations += 1;
            }
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(creations, 1);
        assert_eq!(handles_db[0].count_by_signature(&kind, &sig).await.unwrap(), 1);
    }

    /// Occupy the connection thread for `busy` so later calls queue behind it.
    async fn block_connection(db: &CacheDb, busy: Duration) -> tokio::task::JoinHandle<()> {
        let blocker = db.clone();
        let handle = tokio::spawn(async move {
            blocker
                .call(move |_| {
                    std::thread::sleep(busy);
                    Ok(())
                })
                .await
                .unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle
    }

    #[tokio::test]
    async fn test_timed_out_create_persists_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let sig = kind.signature("test", &Map::new()).unwrap();

        let blocker = block_connection(&db, Duration::from_millis(150)).await;
        let hurried = db.clone().with_deadline(Duration::from_millis(50));
        let result = hurried.create_by_signature(&kind, &sig, &Map::new()).await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        let result = hurried.get_latest_or_create_by_signature(&kind, &sig, &Map::new()).await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        blocker.await.unwrap();
        assert_eq!(db.count_by_signature(&kind, &sig).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_within_deadline_commits() {
        let db = CacheDb::open_in_memory().await.unwrap().with_deadline(Duration::from_secs(5));
        let kind = community();
        let sig = kind.signature("test", &Map::new()).unwrap();

        db.create_by_signature(&kind, &sig, &Map::new()).await.unwrap();
        assert_eq!(db.count_by_signature(&kind, &sig).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_complete_entity_once() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let kind = community();
        let sig = kind.signature("test", &Map::new()).unwrap();
        let entity = db.create_by_signature(&kind, &sig, &Map::new()).await.unwrap();
        assert!(!entity.is_complete());

        let done = db.complete_entity(entity.id, json!({"members": 3})).await.unwrap();
        assert!(done.is_complete());
        assert_eq!(done.state, Some(json!({"members": 3})));

        let again = db.complete_entity(entity.id, json!({})).await;
        assert!(matches!(again, Err(Error::Validation(_))));

        let missing = db.complete_entity(9999, json!({})).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
