//! Local replica of every *remote* user's identity, status and position.
//!
//! The relay has no versioning scheme, so a full snapshot is the only way to
//! guarantee convergence after an unknown period of missed deltas: applying
//! one replaces the entire set.  Between snapshots, single-entity deltas keep
//! latency low.  Every mutation writes the full set through to the record
//! cache so a restart can rehydrate before the relay answers.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};

use trailnet_shared::constants::RECORD_PRESENCE;
use trailnet_shared::types::{UserDelta, UserId, UserState};
use trailnet_store::Database;

/// Replica of all known remote users, keyed by id.
///
/// The local user's own state is tracked by the identity collaborator and is
/// never stored here; snapshots and deltas referencing it are filtered out.
pub struct PresenceStore {
    local_id: UserId,
    users: HashMap<UserId, UserState>,
    db: Database,
}

impl PresenceStore {
    /// Build the store, optimistically rehydrating from the record cache.
    ///
    /// A corrupt cached record is discarded with a warning and the store
    /// starts empty; the mandatory post-connect snapshot repairs it.
    pub fn rehydrate(local_id: UserId, db: Database) -> Self {
        let mut store = Self {
            local_id,
            users: HashMap::new(),
            db,
        };

        match store.db.get_record(RECORD_PRESENCE) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<UserState>>(&raw) {
                Ok(users) => {
                    for user in users {
                        if user.id != store.local_id {
                            store.users.insert(user.id.clone(), user);
                        }
                    }
                    debug!(count = store.users.len(), "rehydrated presence replica");
                }
                Err(e) => {
                    warn!(error = %e, "corrupt presence record, starting empty");
                    let _ = store.db.remove_record(RECORD_PRESENCE);
                }
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read presence record"),
        }

        store
    }

    /// Total replacement: clear all entries and repopulate from the snapshot.
    pub fn apply_snapshot(&mut self, users: Vec<UserState>) {
        self.users.clear();
        for user in users {
            if user.id != self.local_id {
                self.users.insert(user.id.clone(), user);
            }
        }
        debug!(count = self.users.len(), "applied presence snapshot");
        self.persist();
    }

    /// A user joined.  Replaces any stale entry with the same id.
    pub fn apply_add(&mut self, user: UserState) {
        if user.id == self.local_id {
            return;
        }
        self.users.insert(user.id.clone(), user);
        self.persist();
    }

    /// Apply a partial delta against a known entry.
    ///
    /// A delta referencing an unknown id is ignored: it raced the
    /// post-reconnect resynchronization and the forthcoming snapshot will
    /// converge the store.
    pub fn apply_update(&mut self, id: &UserId, delta: UserDelta) {
        let Some(user) = self.users.get_mut(id) else {
            debug!(user = %id, "ignoring delta for unknown user");
            return;
        };

        if let Some(status) = delta.status {
            user.status = status;
        }
        if let Some(position) = delta.position {
            user.position = position;
        }
        user.last_seen_at = Utc::now();
        self.persist();
    }

    /// Remove a user on an explicit relay event.  Unknown ids are ignored.
    pub fn apply_remove(&mut self, id: &UserId) {
        if self.users.remove(id).is_some() {
            self.persist();
        }
    }

    /// Look up one user.  Never panics, never errors.
    pub fn get(&self, id: &UserId) -> Option<&UserState> {
        self.users.get(id)
    }

    /// Snapshot of all known remote users, ordered by id.
    pub fn all(&self) -> Vec<UserState> {
        let mut users: Vec<UserState> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    /// Number of known remote users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Write the full retained set through to the record cache.
    ///
    /// Persistence is fire-and-forget from the caller's perspective: a failed
    /// write is logged, never propagated.
    fn persist(&self) {
        let users = self.all();
        match serde_json::to_string(&users) {
            Ok(raw) => {
                if let Err(e) = self.db.set_record(RECORD_PRESENCE, &raw) {
                    warn!(error = %e, "failed to persist presence replica");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize presence replica"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trailnet_shared::types::{Position, UserStatus};

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn user(id: &str, status: UserStatus, lat: f64, lon: f64) -> UserState {
        UserState {
            id: id.into(),
            display_name: format!("user {id}"),
            status,
            position: Position::new(lat, lon),
            last_seen_at: Utc::now(),
        }
    }

    fn store(db: &Database) -> PresenceStore {
        PresenceStore::rehydrate("me".into(), db.clone())
    }

    #[test]
    fn snapshot_replaces_prior_content() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_snapshot(vec![
            user("u1", UserStatus::Available, 0.0, 0.0),
            user("u2", UserStatus::Busy, 1.0, 1.0),
        ]);
        presence.apply_snapshot(vec![user("u3", UserStatus::Hiking, 2.0, 2.0)]);

        assert_eq!(presence.len(), 1);
        assert!(presence.get(&"u1".into()).is_none());
        assert!(presence.get(&"u3".into()).is_some());
    }

    #[test]
    fn snapshot_content_is_exactly_the_given_set_despite_prior_deltas() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_add(user("u1", UserStatus::Available, 0.0, 0.0));
        presence.apply_update(&"u1".into(), UserDelta::status(UserStatus::Busy));
        presence.apply_remove(&"u1".into());

        let snapshot = vec![
            user("u1", UserStatus::Available, 0.0, 0.0),
            user("u2", UserStatus::Traveling, 5.0, 5.0),
        ];
        presence.apply_snapshot(snapshot.clone());

        assert_eq!(presence.all(), snapshot);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        let snapshot = vec![user("u1", UserStatus::Available, 0.0, 0.0)];
        presence.apply_snapshot(snapshot.clone());
        let once = presence.all();
        presence.apply_snapshot(snapshot);
        assert_eq!(presence.all(), once);
    }

    #[test]
    fn delta_after_snapshot_updates_in_place() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_snapshot(vec![user("u1", UserStatus::Available, 0.0, 0.0)]);
        presence.apply_update(&"u1".into(), UserDelta::status(UserStatus::Hiking));

        assert_eq!(
            presence.get(&"u1".into()).unwrap().status,
            UserStatus::Hiking
        );
    }

    #[test]
    fn delta_for_unknown_user_is_ignored() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_update(&"ghost".into(), UserDelta::status(UserStatus::Busy));
        assert!(presence.is_empty());
    }

    #[test]
    fn local_user_is_never_stored() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_snapshot(vec![
            user("me", UserStatus::Available, 0.0, 0.0),
            user("u1", UserStatus::Busy, 1.0, 1.0),
        ]);
        presence.apply_add(user("me", UserStatus::Hiking, 2.0, 2.0));

        assert_eq!(presence.len(), 1);
        assert!(presence.get(&"me".into()).is_none());
    }

    #[test]
    fn position_delta_updates_position_only() {
        let (_dir, db) = test_db();
        let mut presence = store(&db);

        presence.apply_snapshot(vec![user("u1", UserStatus::Hiking, 0.0, 0.0)]);
        presence.apply_update(&"u1".into(), UserDelta::position(Position::new(3.5, 4.5)));

        let state = presence.get(&"u1".into()).unwrap();
        assert_eq!(state.position, Position::new(3.5, 4.5));
        assert_eq!(state.status, UserStatus::Hiking);
    }

    #[test]
    fn rehydrates_persisted_content() {
        let (_dir, db) = test_db();

        let snapshot = vec![
            user("u1", UserStatus::Available, 0.0, 0.0),
            user("u2", UserStatus::Busy, 1.0, 1.0),
        ];
        store(&db).apply_snapshot(snapshot.clone());

        let rehydrated = store(&db);
        assert_eq!(rehydrated.all(), snapshot);
    }

    #[test]
    fn corrupt_record_starts_empty_and_is_discarded() {
        let (_dir, db) = test_db();
        db.set_record(RECORD_PRESENCE, "not valid json").unwrap();

        let presence = store(&db);
        assert!(presence.is_empty());
        assert_eq!(db.get_record(RECORD_PRESENCE).unwrap(), None);
    }
}
