//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::info;

use docent_core::error::DocentError;

use crate::migrations;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Thread-safe SQLite database wrapper.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, and runs all pending
    /// migrations.
    pub fn new(path: &Path) -> Result<Self, DocentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| DocentError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| DocentError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());
        Self::migrated(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, DocentError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DocentError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, DocentError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DocentError>
    where
        F: FnOnce(&Connection) -> Result<T, DocentError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DocentError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Like [`with_conn`](Self::with_conn), but gives up with
    /// [`DocentError::Timeout`] if the connection stays busy for `wait`.
    ///
    /// `f` never runs after a timeout.
    pub fn with_conn_timeout<F, T>(&self, wait: Duration, f: F) -> Result<T, DocentError>
    where
        F: FnOnce(&Connection) -> Result<T, DocentError>,
    {
        let deadline = Instant::now() + wait;
        loop {
            match self.conn.try_lock() {
                Ok(conn) => return f(&conn),
                Err(TryLockError::Poisoned(e)) => {
                    return Err(DocentError::Storage(format!("Database lock poisoned: {}", e)))
                }
                Err(TryLockError::WouldBlock) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DocentError::Timeout(wait));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL.min(deadline - now));
                }
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
