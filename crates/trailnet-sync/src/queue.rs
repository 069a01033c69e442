//! Ordered, persisted queue of not-yet-sent outbound operations.
//!
//! Strict FIFO with no size cap and no coalescing: every status and position
//! change the user produced is replayed individually, in the exact order it
//! was produced, even when redundant.  Each entry hits disk when enqueued and
//! is deleted only after its transmit call has been issued during a drain, so
//! a drop mid-drain leaves exactly the un-issued suffix for the next attempt.

use std::collections::VecDeque;

use tracing::{debug, warn};

use trailnet_shared::types::{Operation, QueuedOperation};
use trailnet_store::Database;

/// Entry paired with its persisted row id (`None` if the disk write failed
/// and the entry lives only in memory for this process lifetime).
struct QueuedItem {
    row_id: Option<i64>,
    op: QueuedOperation,
}

/// The offline operation queue.
pub struct OfflineQueue {
    items: VecDeque<QueuedItem>,
    db: Database,
}

impl OfflineQueue {
    /// Load any operations left over from a previous run, in original order.
    pub fn rehydrate(db: Database) -> Self {
        let items: VecDeque<QueuedItem> = match db.queue_all() {
            Ok(rows) => rows
                .into_iter()
                .map(|(row_id, op)| QueuedItem {
                    row_id: Some(row_id),
                    op,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to load offline queue");
                VecDeque::new()
            }
        };

        let queue = Self { items, db };
        if !queue.is_empty() {
            debug!(count = queue.len(), "rehydrated offline queue");
        }
        queue
    }

    /// Append unconditionally to the tail.  Never blocks, never errors back
    /// to the caller: a failed disk write downgrades the entry to in-memory.
    pub fn enqueue(&mut self, op: Operation) {
        let queued = QueuedOperation::new(op);
        let row_id = match self.db.queue_push(&queued) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to persist queued operation");
                None
            }
        };
        self.items.push_back(QueuedItem { row_id, op: queued });
    }

    /// The operation at the head, without removing it.
    pub fn front(&self) -> Option<&QueuedOperation> {
        self.items.front().map(|item| &item.op)
    }

    /// Remove the head after its transmit call has been issued.
    ///
    /// Called once per item during a drain, immediately after the send --
    /// never batched at the end -- so items already handed to the transport
    /// are not resent on the next drain.
    pub fn pop_issued(&mut self) {
        if let Some(item) = self.items.pop_front() {
            if let Some(row_id) = item.row_id {
                if let Err(e) = self.db.queue_remove(row_id) {
                    warn!(row = row_id, error = %e, "failed to delete drained queue row");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailnet_shared::types::{Position, UserStatus};

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn fifo_order_is_preserved() {
        let (_dir, db) = test_db();
        let mut queue = OfflineQueue::rehydrate(db);

        queue.enqueue(Operation::UpdateStatus {
            status: UserStatus::Busy,
        });
        queue.enqueue(Operation::UpdatePosition {
            position: Position::new(1.0, 1.0),
        });
        queue.enqueue(Operation::SendGroupMessage {
            body: "made it to camp".into(),
        });

        assert!(matches!(
            queue.front().unwrap().op,
            Operation::UpdateStatus { .. }
        ));
        queue.pop_issued();
        assert!(matches!(
            queue.front().unwrap().op,
            Operation::UpdatePosition { .. }
        ));
        queue.pop_issued();
        assert!(matches!(
            queue.front().unwrap().op,
            Operation::SendGroupMessage { .. }
        ));
        queue.pop_issued();
        assert!(queue.is_empty());
    }

    #[test]
    fn interrupted_drain_leaves_unissued_suffix() {
        let (_dir, db) = test_db();
        let mut queue = OfflineQueue::rehydrate(db.clone());

        for n in 0..5 {
            queue.enqueue(Operation::SendGroupMessage {
                body: format!("m{n}"),
            });
        }

        // Drain is interrupted after two items were issued.
        queue.pop_issued();
        queue.pop_issued();

        // Both the in-memory view and the persisted rows hold exactly m2..m4.
        assert_eq!(queue.len(), 3);
        let rows = db.queue_all().unwrap();
        assert_eq!(rows.len(), 3);
        let bodies: Vec<&str> = rows
            .iter()
            .map(|(_, q)| match &q.op {
                Operation::SendGroupMessage { body } => body.as_str(),
                _ => panic!("unexpected kind"),
            })
            .collect();
        assert_eq!(bodies, ["m2", "m3", "m4"]);
    }

    #[test]
    fn queue_survives_restart_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let db = Database::open_at(&path).unwrap();
            let mut queue = OfflineQueue::rehydrate(db);
            queue.enqueue(Operation::UpdateStatus {
                status: UserStatus::Busy,
            });
            queue.enqueue(Operation::UpdateStatus {
                status: UserStatus::Hiking,
            });
            queue.pop_issued();
        }

        let db = Database::open_at(&path).unwrap();
        let queue = OfflineQueue::rehydrate(db);
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue.front().unwrap().op,
            Operation::UpdateStatus {
                status: UserStatus::Hiking
            }
        ));
    }

    #[test]
    fn same_kind_operations_are_not_coalesced() {
        let (_dir, db) = test_db();
        let mut queue = OfflineQueue::rehydrate(db);

        for n in 0..4 {
            queue.enqueue(Operation::UpdatePosition {
                position: Position::new(n as f64, n as f64),
            });
        }
        assert_eq!(queue.len(), 4);
    }
}
