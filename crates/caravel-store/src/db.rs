//! Database connection management.
//!
//! Wraps a single rusqlite `Connection` in a `Mutex`. Configures WAL mode,
//! foreign keys and a busy timeout, then runs pending migrations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use caravel_contracts::error::{CaravelError, CaravelResult};

use crate::migrations;

/// Map a rusqlite error into `CaravelError::Storage` with some context.
pub(crate) fn storage(context: &'static str) -> impl Fn(rusqlite::Error) -> CaravelError {
    move |e| CaravelError::Storage {
        reason: format!("{context}: {e}"),
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file at `path` and migrate it.
    pub fn open(path: &Path) -> CaravelResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CaravelError::Storage {
                    reason: format!("failed to create database directory: {e}"),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(storage("failed to open database"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(storage("failed to set pragmas"))?;

        info!(path = %path.display(), "database opened");
        Self::migrated(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> CaravelResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage("failed to open in-memory db"))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(storage("failed to set pragmas"))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> CaravelResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(|conn| migrations::run_migrations(conn))?;
        Ok(db)
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> CaravelResult<T>
    where
        F: FnOnce(&mut Connection) -> CaravelResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| CaravelError::Storage {
            reason: format!("database lock poisoned: {e}"),
        })?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
