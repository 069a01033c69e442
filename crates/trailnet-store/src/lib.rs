//! # trailnet-store
//!
//! Durable local persistence for the Trailnet sync core, backed by SQLite.
//!
//! Two things live here: a generic key-value record cache that the presence
//! and chat replicas write through to (so the UI has state to show before the
//! relay answers after a restart), and the persisted offline operation queue
//! that survives a process restart between disconnect and reconnect.

pub mod cache;
pub mod database;
pub mod migrations;
pub mod queue;

mod error;

pub use database::Database;
pub use error::StoreError;
