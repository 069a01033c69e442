//! Wire protocol between a client and the relay.
//!
//! Every frame is a single JSON object tagged with a `type` field and an
//! optional `data` payload.  The relay carries no sequence numbers or resume
//! tokens: recovering from missed events is always done by re-requesting a
//! full snapshot / history, never by replaying deltas.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Message, Operation, Position, UserId, UserState, UserStatus};

/// Failure to encode or decode a protocol frame.
#[derive(Error, Debug)]
#[error("protocol frame error: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

/// Events pushed by the relay to the client, one per logical change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Complete replacement view of all connected users.
    Snapshot(Vec<UserState>),
    /// A user connected and registered.
    UserJoined(UserState),
    /// A user disconnected.
    UserLeft(UserId),
    /// A user changed their availability status.
    StatusChanged { id: UserId, status: UserStatus },
    /// A user reported a new position fix.
    PositionChanged { id: UserId, position: Position },
    /// A message posted to the group conversation.
    GroupMessage(Message),
    /// A message addressed to the local user.
    PrivateMessage(Message),
    /// Authoritative group history, sent in reply to a request.
    GroupHistory(Vec<Message>),
    /// Authoritative history of one private conversation.
    PrivateHistory {
        peer: UserId,
        messages: Vec<Message>,
    },
}

/// Commands sent by the client to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Announce the local user on a fresh connection.
    Register(UserState),
    /// Ask for the complete current user set.
    RequestSnapshot,
    /// Ask for the full group chat history.
    RequestGroupHistory,
    /// Ask for the history of one private conversation.
    RequestPrivateHistory { peer: UserId },
    /// Broadcast a status change.
    UpdateStatus { status: UserStatus },
    /// Broadcast a position fix.
    UpdatePosition { position: Position },
    /// Post a message to the group conversation.
    SendGroupMessage { body: String },
    /// Send a message to one user.
    SendPrivateMessage { to: UserId, body: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl ClientCommand {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Queued local mutations map one-to-one onto outbound commands.
impl From<Operation> for ClientCommand {
    fn from(op: Operation) -> Self {
        match op {
            Operation::UpdateStatus { status } => ClientCommand::UpdateStatus { status },
            Operation::UpdatePosition { position } => ClientCommand::UpdatePosition { position },
            Operation::SendGroupMessage { body } => ClientCommand::SendGroupMessage { body },
            Operation::SendPrivateMessage { to, body } => {
                ClientCommand::SendPrivateMessage { to, body }
            }
        }
    }
}
