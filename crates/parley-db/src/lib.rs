pub mod conversations;
pub mod error;
pub mod membership;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod receipts;
pub mod users;

pub use error::{CoreError, Result};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_POOL_SIZE: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pooled SQLite handle. Each connection sits behind its own mutex so a
/// request-scoped worker has exclusive use of it for the length of one
/// transaction; all cross-request coordination is left to SQLite's locking.
pub struct Database {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_pool(path, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool(path: &Path, pool_size: usize) -> Result<Self> {
        let pool_size = pool_size.max(1);
        let mut conns = Vec::with_capacity(pool_size);

        for i in 0..pool_size {
            let conn = Connection::open(path)?;
            configure(&conn)?;
            if i == 0 {
                migrations::run(&conn)?;
            }
            conns.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} ({} connections)",
            path.display(),
            pool_size
        );
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    /// Single-connection in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        migrations::run(&conn)?;

        Ok(Self {
            conns: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
        })
    }

    /// Run `f` inside a deferred transaction so multi-query reads see one snapshot.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.checkout()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside an immediate (write-locked) transaction. Anything `f`
    /// returns as an error rolls the whole unit back.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.checkout()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn checkout(&self) -> Result<MutexGuard<'_, Connection>> {
        let len = self.conns.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            match self.conns[(start + offset) % len].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(CoreError::Pool(format!("connection lock poisoned: {}", e)));
                }
            }
        }

        // Every connection is busy: wait for the one we were assigned.
        self.conns[start]
            .lock()
            .map_err(|e| CoreError::Pool(format!("connection lock poisoned: {}", e)))
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // WAL mode for concurrent readers alongside the single writer
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}
