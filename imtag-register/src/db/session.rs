//! Shared SQLite session
//!
//! Repositories built on one [`SqliteSession`] share a single transaction, so
//! committing (or rolling back) through any of them covers the writes of all
//! of them. The transaction begins lazily on the first write.

use futures::future::{BoxFuture, FutureExt};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

/// Transaction currently held by a session
pub struct OpenTransaction {
    tx: Transaction<'static, Sqlite>,
    began_at: Instant,
}

pub type Slot = Option<OpenTransaction>;

/// One pending transaction shared by several repositories
///
/// Dropping the session with a transaction still open rolls it back.
/// Every future handed out is `'static` and owns its handles, so repository
/// futures holding a [`SessionConnection`] stay `Send`.
pub struct SqliteSession {
    pool: SqlitePool,
    current: Arc<Mutex<Slot>>,
}

/// Connection lent out for one statement sequence
///
/// While the session has an open transaction this is that transaction and
/// the session stays locked until the guard is dropped.
pub enum SessionConnection {
    Transaction(OwnedMappedMutexGuard<Slot, Transaction<'static, Sqlite>>),
    Pooled(PoolConnection<Sqlite>),
}

impl Deref for SessionConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            SessionConnection::Transaction(tx) => &***tx,
            SessionConnection::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for SessionConnection {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            SessionConnection::Transaction(tx) => &mut ***tx,
            SessionConnection::Pooled(conn) => &mut **conn,
        }
    }
}

fn open_transaction(slot: &mut Slot) -> Option<&mut Transaction<'static, Sqlite>> {
    slot.as_mut().map(|open| &mut open.tx)
}

impl SqliteSession {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connection for writes, beginning a transaction when none is open
    pub fn write(&self) -> BoxFuture<'static, Result<SessionConnection, sqlx::Error>> {
        let pool = self.pool.clone();
        let current = Arc::clone(&self.current);

        async move {
            let mut slot = current.lock_owned().await;

            if slot.is_none() {
                let tx = pool.begin().await?;
                tracing::debug!("Transaction started");
                *slot = Some(OpenTransaction {
                    tx,
                    began_at: Instant::now(),
                });
            }

            OwnedMutexGuard::try_map(slot, open_transaction)
                .map(SessionConnection::Transaction)
                .map_err(|_| sqlx::Error::Protocol("transaction closed while locked".to_string()))
        }
        .boxed()
    }

    /// Connection for reads
    ///
    /// Inside an open transaction reads see its uncommitted writes; otherwise
    /// a pooled connection is used.
    pub fn read(&self) -> BoxFuture<'static, Result<SessionConnection, sqlx::Error>> {
        let pool = self.pool.clone();
        let current = Arc::clone(&self.current);

        async move {
            let slot = current.lock_owned().await;
            let idle = match OwnedMutexGuard::try_map(slot, open_transaction) {
                Ok(tx) => return Ok(SessionConnection::Transaction(tx)),
                Err(idle) => idle,
            };
            drop(idle);

            Ok(SessionConnection::Pooled(pool.acquire().await?))
        }
        .boxed()
    }

    pub async fn in_transaction(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Commit the open transaction, if any
    pub fn commit(&self) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        let current = Arc::clone(&self.current);

        async move {
            let Some(open) = current.lock_owned().await.take() else {
                return Ok(());
            };

            let held = open.began_at.elapsed();
            open.tx.commit().await?;
            log_release("commit", held);
            Ok(())
        }
        .boxed()
    }

    /// Roll back the open transaction, if any
    pub fn rollback(&self) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        let current = Arc::clone(&self.current);

        async move {
            let Some(open) = current.lock_owned().await.take() else {
                return Ok(());
            };

            let held = open.began_at.elapsed();
            open.tx.rollback().await?;
            log_release("rollback", held);
            Ok(())
        }
        .boxed()
    }
}

/// Alert on long-held write transactions, which block every other writer
fn log_release(action: &'static str, held: Duration) {
    let held_ms = held.as_millis();
    if held_ms > 2000 {
        tracing::warn!(action, held_ms, "LONG TRANSACTION - write lock held for extended period");
    } else if held_ms > 1000 {
        tracing::info!(action, held_ms, "Transaction held longer than expected (>1s)");
    } else {
        tracing::debug!(action, held_ms, "Transaction finished");
    }
}
