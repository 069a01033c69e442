//! Local replica of the group message log and the per-peer private logs.
//!
//! Messages are append-only and immutable; they leave the store only through
//! bulk truncation (retention bound) or an explicit clear on session
//! teardown.  After a (re)connect the relay's history *replaces* the local
//! log rather than merging into it, so overlapping cache and server history
//! can never produce duplicates.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, warn};

use trailnet_shared::constants::{
    GROUP_HISTORY_LIMIT, PRIVATE_HISTORY_LIMIT, RECORD_CHAT_GROUP, RECORD_CHAT_PRIVATE,
};
use trailnet_shared::types::{Message, UserId};
use trailnet_store::Database;

/// Replica of the chat history visible to the local user.
pub struct ChatStore {
    local_id: UserId,
    group: VecDeque<Message>,
    private: BTreeMap<UserId, VecDeque<Message>>,
    db: Database,
}

impl ChatStore {
    /// Build the store, optimistically rehydrating both logs from the record
    /// cache.  Corrupt records are discarded with a warning.
    pub fn rehydrate(local_id: UserId, db: Database) -> Self {
        let mut store = Self {
            local_id,
            group: VecDeque::new(),
            private: BTreeMap::new(),
            db,
        };

        store.group = store
            .load_record::<Vec<Message>>(RECORD_CHAT_GROUP)
            .map(VecDeque::from)
            .unwrap_or_default();
        store.private = store
            .load_record::<BTreeMap<UserId, Vec<Message>>>(RECORD_CHAT_PRIVATE)
            .map(|logs| {
                logs.into_iter()
                    .map(|(peer, log)| (peer, VecDeque::from(log)))
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            group = store.group.len(),
            peers = store.private.len(),
            "rehydrated chat replica"
        );
        store
    }

    /// Append to the group log, enforce retention, persist.
    pub fn append_group(&mut self, message: Message) {
        self.group.push_back(message);
        while self.group.len() > GROUP_HISTORY_LIMIT {
            self.group.pop_front();
        }
        self.persist_group();
    }

    /// Append to the right private conversation log, enforce retention,
    /// persist.  Group messages handed here are a routing bug and are dropped.
    pub fn append_private(&mut self, message: Message) {
        let Some(peer) = self.conversation_peer(&message) else {
            warn!("group message routed to private log, dropping");
            return;
        };

        let log = self.private.entry(peer).or_default();
        log.push_back(message);
        while log.len() > PRIVATE_HISTORY_LIMIT {
            log.pop_front();
        }
        self.persist_private();
    }

    /// Replace the group log with the relay's authoritative history.
    pub fn replace_group_history(&mut self, messages: Vec<Message>) {
        self.group = VecDeque::from(messages);
        while self.group.len() > GROUP_HISTORY_LIMIT {
            self.group.pop_front();
        }
        self.persist_group();
    }

    /// Replace one private log with the relay's authoritative history.
    pub fn replace_private_history(&mut self, peer: UserId, messages: Vec<Message>) {
        let mut log = VecDeque::from(messages);
        while log.len() > PRIVATE_HISTORY_LIMIT {
            log.pop_front();
        }
        self.private.insert(peer, log);
        self.persist_private();
    }

    /// The group log, oldest first.
    pub fn group_history(&self) -> Vec<Message> {
        self.group.iter().cloned().collect()
    }

    /// One private log, oldest first.  An unknown peer yields an empty
    /// sequence, never "not found".
    pub fn private_history(&self, peer: &UserId) -> Vec<Message> {
        self.private
            .get(peer)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All peers with a private conversation log.
    pub fn private_peers(&self) -> Vec<UserId> {
        self.private.keys().cloned().collect()
    }

    /// Empty both logs and persist the empty state.  Used on explicit session
    /// teardown (logout), not a normal flow path.
    pub fn clear_all(&mut self) {
        self.group.clear();
        self.private.clear();
        self.persist_group();
        self.persist_private();
    }

    /// The conversation a private message belongs to: the other party.
    fn conversation_peer(&self, message: &Message) -> Option<UserId> {
        match message {
            Message::Private {
                sender_id,
                recipient_id,
                ..
            } => {
                if *sender_id == self.local_id {
                    Some(recipient_id.clone())
                } else {
                    Some(sender_id.clone())
                }
            }
            Message::Group { .. } => None,
        }
    }

    fn load_record<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.db.get_record(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "corrupt chat record, starting empty");
                    let _ = self.db.remove_record(key);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "failed to read chat record");
                None
            }
        }
    }

    fn persist_group(&self) {
        self.write_record(RECORD_CHAT_GROUP, &self.group_history());
    }

    fn persist_private(&self) {
        let logs: BTreeMap<&UserId, Vec<Message>> = self
            .private
            .iter()
            .map(|(peer, log)| (peer, log.iter().cloned().collect()))
            .collect();
        self.write_record(RECORD_CHAT_PRIVATE, &logs);
    }

    /// Fire-and-forget write-through; a failed write is logged, never
    /// propagated.
    fn write_record<T: serde::Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = self.db.set_record(key, &raw) {
                    warn!(key, error = %e, "failed to persist chat replica");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to serialize chat replica"),
        }
    }
}
