//! # trailnet-shared
//!
//! Data model and wire protocol shared between the Trailnet sync core and
//! anything that talks to (or mocks) the relay.  This crate performs no I/O;
//! every type here is plain data with serde derives.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ClientCommand, ProtocolError, ServerEvent};
pub use types::{
    ConnectionStatus, Message, Operation, Position, QueuedOperation, UserDelta, UserId, UserState,
    UserStatus,
};
