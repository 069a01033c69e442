//! Transport seam between the session state machine and the wire.
//!
//! A [`Transport`] produces one [`TransportLink`] per successful connection
//! attempt: a pair of channels carrying already-decoded protocol frames.  The
//! session detects a dead link through the channels themselves -- the inbound
//! receiver yields `None` once the read side is gone, and sending on the
//! outbound channel fails once the write side is gone.  Tests substitute a
//! channel-backed mock; production uses [`crate::ws::WsTransport`].

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

use trailnet_shared::protocol::{ClientCommand, ServerEvent};

/// Failure to establish a connection.  Never fatal: the session state machine
/// resolves every variant by scheduling another attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The handshake did not complete within the configured timeout.
    #[error("connect timed out")]
    Timeout,

    /// The handshake itself failed (refused, DNS, TLS, protocol error).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The link closed before it was usable.
    #[error("connection closed")]
    Closed,
}

/// One established connection to the relay.
pub struct TransportLink {
    /// Commands handed to the write side.  A send error means the link died.
    pub outbound: mpsc::UnboundedSender<ClientCommand>,
    /// Decoded events from the read side.  `None` means the link died.
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Something that can (re)connect to the relay.
pub trait Transport: Send + 'static {
    /// Attempt one connection, including the handshake timeout.
    fn connect(&mut self) -> BoxFuture<'_, Result<TransportLink, TransportError>>;
}

/// Build a link plus the test-side handles to both of its ends.
///
/// Exposed for integration tests and mock transports.
pub fn link_pair() -> (
    TransportLink,
    mpsc::UnboundedReceiver<ClientCommand>,
    mpsc::UnboundedSender<ServerEvent>,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        outbound_rx,
        inbound_tx,
    )
}
