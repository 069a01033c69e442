use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque user identifier assigned by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Availability status a user broadcasts to the group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UserStatus {
    Available,
    Hiking,
    Traveling,
    Busy,
}

/// A geographic position fix (WGS-84 degrees).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Everything the relay knows about one user: identity, status, last
/// reported position, and when we last heard from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserState {
    pub id: UserId,
    pub display_name: String,
    pub status: UserStatus,
    pub position: Position,
    pub last_seen_at: DateTime<Utc>,
}

/// Partial update applied against an already-known [`UserState`].
///
/// Fields left as `None` keep their previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserDelta {
    pub status: Option<UserStatus>,
    pub position: Option<Position>,
}

impl UserDelta {
    pub fn status(status: UserStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat message, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// A message broadcast to the whole group.
    Group {
        sender_id: UserId,
        sender_name: String,
        body: String,
        sent_at: DateTime<Utc>,
    },
    /// A message between exactly two users.
    Private {
        sender_id: UserId,
        recipient_id: UserId,
        sender_name: String,
        body: String,
        sent_at: DateTime<Utc>,
    },
}

impl Message {
    pub fn sender_id(&self) -> &UserId {
        match self {
            Message::Group { sender_id, .. } | Message::Private { sender_id, .. } => sender_id,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Message::Group { body, .. } | Message::Private { body, .. } => body,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Message::Group { sent_at, .. } | Message::Private { sent_at, .. } => *sent_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Offline queue
// ---------------------------------------------------------------------------

/// A local mutation that must eventually reach the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Operation {
    UpdateStatus { status: UserStatus },
    UpdatePosition { position: Position },
    SendGroupMessage { body: String },
    SendPrivateMessage { to: UserId, body: String },
}

/// An [`Operation`] waiting in the offline queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedOperation {
    pub op: Operation,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedOperation {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            enqueued_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Lifecycle state of the relay connection, exposed for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn user_status_wire_form_is_kebab_case() {
        assert_eq!(
            serde_json::to_string(&UserStatus::Traveling).unwrap(),
            "\"traveling\""
        );
    }

    #[test]
    fn message_accessors() {
        let msg = Message::Private {
            sender_id: "u1".into(),
            recipient_id: "u2".into(),
            sender_name: "Ada".into(),
            body: "meet at the pass".into(),
            sent_at: Utc::now(),
        };
        assert_eq!(msg.sender_id().as_str(), "u1");
        assert_eq!(msg.body(), "meet at the pass");
    }

    #[test]
    fn queued_operation_roundtrip() {
        let op = QueuedOperation::new(Operation::SendPrivateMessage {
            to: "u2".into(),
            body: "hello".into(),
        });
        let json = serde_json::to_string(&op).unwrap();
        let back: QueuedOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
