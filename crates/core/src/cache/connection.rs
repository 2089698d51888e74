//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, Transaction, TransactionBehavior};

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Clones share the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    deadline: Option<Duration>,
}

impl CacheDb {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, deadline: None })
    }

    /// Bound every subsequent store call by `deadline`.
    ///
    /// A call that runs past it fails with `Error::Timeout`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Run a read on the connection thread, honoring the deadline.
    pub(crate) async fn call<F, R>(&self, function: F) -> Result<R, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let pending = self.conn.call(function);
        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, pending)
                .await
                .map_err(|_| Error::Timeout(format!("store call exceeded {}ms", deadline.as_millis())))?,
            None => pending.await,
        };
        result.map_err(Error::from)
    }

    /// Run `function` inside an immediate transaction, honoring the deadline.
    ///
    /// The transaction commits only if the caller is still waiting. Once the
    /// caller has been handed `Error::Timeout` the transaction is rolled back,
    /// so a timed-out write never persists anything.
    pub(crate) async fn write<F, R>(&self, function: F) -> Result<R, Error>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let state = WriteState::default();
        let worker = state.clone();
        let pending = self.conn.call(move |conn| -> Result<R, Error> {
            if worker.is_abandoned() {
                return Err(Error::Timeout("store write abandoned before it started".into()));
            }
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = function(&tx)?;
            if !worker.claim_commit() {
                return Err(Error::Timeout("store write abandoned before commit".into()));
            }
            tx.commit()?;
            Ok(value)
        });

        let Some(deadline) = self.deadline else {
            return pending.await.map_err(Error::from);
        };

        let mut pending = std::pin::pin!(pending);
        match tokio::time::timeout(deadline, pending.as_mut()).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) if state.abandon() => {
                Err(Error::Timeout(format!("store write exceeded {}ms", deadline.as_millis())))
            }
            // the commit is already under way; report its outcome
            Err(_) => pending.await.map_err(Error::from),
        }
    }
}

const PENDING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Shared between a waiting caller and the connection thread; whichever
/// moves it out of `PENDING` first decides whether the write commits.
#[derive(Debug, Clone, Default)]
struct WriteState(Arc<AtomicU8>);

impl WriteState {
    fn claim_commit(&self) -> bool {
        self.0
            .compare_exchange(PENDING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == ABANDONED
    }
}
