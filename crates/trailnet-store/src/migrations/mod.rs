//! Schema migrations for the sync-core database.
//!
//! Every [`Database::new`](crate::Database::new) /
//! [`Database::open_at`](crate::Database::open_at) call runs the pending
//! migrations before handing the connection out, so the record cache and the
//! offline queue can assume their tables exist.  Applied state is tracked in
//! SQLite's `user_version` pragma; a migration that already ran is never
//! re-executed.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema version this build expects.  Adding a migration module means
/// bumping this and wiring the new step into [`run_migrations`].
const CURRENT_VERSION: u32 = 1;

/// Bring the database up to [`CURRENT_VERSION`], applying any outstanding
/// migrations in order.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        from = current,
        to = CURRENT_VERSION,
        "running schema migrations"
    );

    if current < 1 {
        tracing::info!("creating initial schema (records, offline_queue)");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
