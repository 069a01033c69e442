//! # trailnet-sync
//!
//! The state-synchronization and offline-resilience core.
//!
//! A [`ConnectionSession`](session) owns the relay transport lifecycle and
//! runs a single dispatch loop: inbound relay events fan out to the
//! [`PresenceStore`](presence::PresenceStore) and
//! [`ChatStore`](chat::ChatStore) replicas, local mutations are transmitted
//! immediately when connected or parked in the persisted
//! [`OfflineQueue`](queue::OfflineQueue) otherwise, and every entry into the
//! connected state triggers a full resynchronization (snapshot + group
//! history) followed by an in-order queue drain.

pub mod chat;
pub mod presence;
pub mod queue;
pub mod session;
pub mod transport;
pub mod ws;

pub use chat::ChatStore;
pub use presence::PresenceStore;
pub use queue::OfflineQueue;
pub use session::{spawn_session, SessionCommand, SessionConfig, SessionHandle};
pub use transport::{Transport, TransportError, TransportLink};
pub use ws::WsTransport;
