//! Generic key-value record cache.
//!
//! The presence and chat replicas serialize their full retained state into
//! one record each and write it through here after every logical mutation.
//! On startup they read the record back to rehydrate before the relay has
//! answered.  The cache knows nothing about the payloads; values are opaque
//! JSON strings.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace a record.  Last write wins.
    pub fn set_record(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetch a record, `None` if the key has never been written.
    pub fn get_record(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Delete a record.  Returns whether anything was removed.
    pub fn remove_record(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM records WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}
