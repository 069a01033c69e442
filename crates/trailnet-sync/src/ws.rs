//! WebSocket transport to the relay, built on tokio-tungstenite.
//!
//! Each successful connect spawns a read task and a write task bridging the
//! socket to the [`TransportLink`] channels.  The write task also owns the
//! keepalive ping.  Either task exiting tears the link down: the read task
//! drops the inbound sender (the session sees `None`) and the write task
//! drops the outbound receiver (the session's next send fails).

use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use trailnet_shared::constants::{CONNECT_TIMEOUT_SECS, PING_INTERVAL_SECS};
use trailnet_shared::protocol::{ClientCommand, ServerEvent};

use crate::transport::{Transport, TransportError, TransportLink};

/// Production transport: one WebSocket connection per `connect` call.
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
    ping_interval: Duration,
}

impl WsTransport {
    /// Transport for the relay at `url` (a `ws://` or `wss://` endpoint).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<TransportLink, TransportError>> {
        let url = self.url.clone();
        let connect_timeout = self.connect_timeout;
        let ping_interval = self.ping_interval;

        Box::pin(async move {
            debug!(url = %url, "connecting to relay");

            let (stream, _response) = time::timeout(connect_timeout, connect_async(&url))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Handshake(e.to_string()))?;

            let (mut write, mut read) = stream.split();
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientCommand>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

            // --- Write task (outbound commands + keepalive pings) ---
            tokio::spawn(async move {
                let mut ping = time::interval(ping_interval);
                ping.tick().await; // skip the immediate first tick
                loop {
                    tokio::select! {
                        cmd = outbound_rx.recv() => match cmd {
                            Some(cmd) => {
                                let json = match cmd.to_json() {
                                    Ok(j) => j,
                                    Err(e) => {
                                        warn!(error = %e, "failed to encode command");
                                        continue;
                                    }
                                };
                                if write.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                // Session dropped the link: close cleanly.
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        },
                        _ = ping.tick() => {
                            if write.send(Message::Ping(Vec::new())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });

            // --- Read task (inbound events) ---
            tokio::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match ServerEvent::from_json(&text) {
                            Ok(event) => {
                                if inbound_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, "ignoring unrecognized frame");
                            }
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {} // pings, pongs, binary frames
                        Err(e) => {
                            warn!(error = %e, "WebSocket read error");
                            break;
                        }
                    }
                }
                // Dropping inbound_tx is the disconnect signal to the session.
            });

            Ok(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}
