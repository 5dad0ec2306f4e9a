//! SQLite handle shared by the transcript stores.
//!
//! A single connection behind a `Mutex`. File databases run in WAL mode and
//! every database is migrated to the latest schema before it is handed out.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use solace_core::error::SolaceError;

use crate::migrations;

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Mutex-guarded SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases.
    location: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed.
    pub fn new(path: &Path) -> Result<Self, SolaceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SolaceError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| SolaceError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self::prepare(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), schema = db.schema_version()?, "Transcript database ready");
        Ok(db)
    }

    /// Open a private in-memory database. Contents vanish on drop.
    pub fn in_memory() -> Result<Self, SolaceError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SolaceError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        let db = Self::prepare(conn, None)?;
        debug!("In-memory transcript database ready");
        Ok(db)
    }

    fn prepare(conn: Connection, location: Option<PathBuf>) -> Result<Self, SolaceError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SolaceError::Storage(format!("Failed to set busy timeout: {}", e)))?;
        let db = Self {
            conn: Mutex::new(conn),
            location,
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` against the connection while holding the lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, SolaceError>
    where
        F: FnOnce(&Connection) -> Result<T, SolaceError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SolaceError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Highest applied migration version.
    pub fn schema_version(&self) -> Result<i64, SolaceError> {
        self.with_conn(migrations::current_version)
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
