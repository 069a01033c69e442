//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `records` (generic key-value cache for the
//! presence and chat replicas) and `offline_queue` (persisted FIFO of
//! not-yet-sent operations).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Records: generic key-value cache
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS records (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,               -- opaque JSON payload
    updated_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Offline queue: strict FIFO via monotonic rowid
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS offline_queue (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    payload     TEXT NOT NULL,              -- JSON-encoded QueuedOperation
    enqueued_at TEXT NOT NULL               -- ISO-8601 / RFC-3339
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
