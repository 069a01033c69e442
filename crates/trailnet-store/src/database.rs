//! Database connection management.
//!
//! The [`Database`] struct wraps a [`rusqlite::Connection`] behind an
//! `Arc<Mutex<_>>` so the handle can be cloned into each replica (presence,
//! chat, offline queue) while all writes still happen on the single session
//! task.  Migrations are guaranteed to have run before any other operation.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Cloneable handle to the local SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/trailnet/trailnet.db`
    /// - macOS:   `~/Library/Application Support/org.trailnet.trailnet/trailnet.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\trailnet\trailnet\data\trailnet.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", "trailnet", "trailnet").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("trailnet.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the underlying connection.
    ///
    /// A poisoned mutex only means another holder panicked mid-operation;
    /// SQLite itself is still consistent, so we take the guard anyway.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert!(version >= 1);
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Database::open_at(&path).unwrap());
        // Second open must not fail re-applying migrations.
        Database::open_at(&path).unwrap();
    }
}
