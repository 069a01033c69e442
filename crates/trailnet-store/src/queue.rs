//! Persisted rows of the offline operation queue.
//!
//! The in-memory FIFO lives in the sync crate; this module only guarantees
//! that every enqueued operation hits disk before it is considered queued,
//! and that insertion order is recoverable after a restart (monotonic
//! `AUTOINCREMENT` rowid, never reused).

use rusqlite::params;
use trailnet_shared::types::QueuedOperation;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Append an operation to the persisted queue.  Returns its row id.
    pub fn queue_push(&self, op: &QueuedOperation) -> Result<i64> {
        let payload = serde_json::to_string(op)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO offline_queue (payload, enqueued_at) VALUES (?1, ?2)",
            params![payload, op.enqueued_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Load the whole queue in insertion order.
    ///
    /// A row whose payload no longer decodes is dropped with a warning; the
    /// remaining entries keep their relative order.
    pub fn queue_all(&self) -> Result<Vec<(i64, QueuedOperation)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, payload FROM offline_queue ORDER BY id ASC")?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let payload: String = row.get(1)?;
            Ok((id, payload))
        })?;

        let mut ops = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match serde_json::from_str::<QueuedOperation>(&payload) {
                Ok(op) => ops.push((id, op)),
                Err(e) => {
                    tracing::warn!(row = id, error = %e, "dropping corrupt queue row");
                }
            }
        }
        Ok(ops)
    }

    /// Remove one replayed operation by row id.
    pub fn queue_remove(&self, id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM offline_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Remove every queued operation.
    pub fn queue_clear(&self) -> Result<()> {
        self.conn().execute("DELETE FROM offline_queue", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailnet_shared::types::{Operation, Position, UserStatus};

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn status_op(status: UserStatus) -> QueuedOperation {
        QueuedOperation::new(Operation::UpdateStatus { status })
    }

    #[test]
    fn push_preserves_insertion_order() {
        let (_dir, db) = test_db();

        db.queue_push(&status_op(UserStatus::Busy)).unwrap();
        db.queue_push(&QueuedOperation::new(Operation::UpdatePosition {
            position: Position::new(1.0, 1.0),
        }))
        .unwrap();
        db.queue_push(&status_op(UserStatus::Hiking)).unwrap();

        let ops = db.queue_all().unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            ops[0].1.op,
            Operation::UpdateStatus {
                status: UserStatus::Busy
            }
        ));
        assert!(matches!(ops[1].1.op, Operation::UpdatePosition { .. }));
        assert!(matches!(
            ops[2].1.op,
            Operation::UpdateStatus {
                status: UserStatus::Hiking
            }
        ));
    }

    #[test]
    fn remove_deletes_only_that_row() {
        let (_dir, db) = test_db();

        let first = db.queue_push(&status_op(UserStatus::Busy)).unwrap();
        db.queue_push(&status_op(UserStatus::Available)).unwrap();

        db.queue_remove(first).unwrap();

        let ops = db.queue_all().unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            ops[0].1.op,
            Operation::UpdateStatus {
                status: UserStatus::Available
            }
        ));
    }

    #[test]
    fn queue_survives_reopen_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let db = Database::open_at(&path).unwrap();
            db.queue_push(&status_op(UserStatus::Busy)).unwrap();
            db.queue_push(&status_op(UserStatus::Hiking)).unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let ops = db.queue_all().unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            ops[0].1.op,
            Operation::UpdateStatus {
                status: UserStatus::Busy
            }
        ));
    }

    #[test]
    fn corrupt_row_is_skipped() {
        let (_dir, db) = test_db();

        db.queue_push(&status_op(UserStatus::Busy)).unwrap();
        db.conn()
            .execute(
                "INSERT INTO offline_queue (payload, enqueued_at) VALUES ('not json', '')",
                [],
            )
            .unwrap();
        db.queue_push(&status_op(UserStatus::Hiking)).unwrap();

        let ops = db.queue_all().unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn clear_empties_queue() {
        let (_dir, db) = test_db();

        db.queue_push(&status_op(UserStatus::Busy)).unwrap();
        db.queue_clear().unwrap();
        assert!(db.queue_all().unwrap().is_empty());
    }
}
