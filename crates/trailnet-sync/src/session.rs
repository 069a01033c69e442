//! Connection session with tokio mpsc command / watch status pattern.
//!
//! The session event loop runs in a dedicated tokio task and is the single
//! writer for the presence replica, the chat replica and the offline queue.
//! External code communicates with it through a typed command channel and
//! observes the connection lifecycle through a `watch` channel, keeping the
//! whole sync layer free of ambient globals and internal locking.
//!
//! Lifecycle: `Idle -> Connecting -> {Connected | Disconnected}`, then
//! `Disconnected -> Reconnecting -> {Connected | Disconnected}` forever --
//! there is no terminal state and no retry cap.  Every entry into Connected
//! sends exactly one register, one snapshot request and one group-history
//! request (the wire carries no resume tokens, so deltas missed during
//! downtime are unrecoverable except by re-fetching full state), then drains
//! the offline queue in order before the Connected status is published.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use trailnet_shared::constants::{RECONNECT_INITIAL_SECS, RECONNECT_MAX_SECS};
use trailnet_shared::protocol::{ClientCommand, ServerEvent};
use trailnet_shared::types::{
    ConnectionStatus, Operation, Position, UserDelta, UserId, UserState, UserStatus,
};
use trailnet_store::Database;

use crate::chat::ChatStore;
use crate::presence::PresenceStore;
use crate::queue::OfflineQueue;
use crate::transport::{Transport, TransportLink};

// ---------------------------------------------------------------------------
// Commands / configuration
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Open the transport for the first time (or again after a failure).
    Connect,
    /// Network-level "link is back" signal from the connectivity collaborator.
    NetworkOnline,
    /// Network-level "link is gone" signal.  Forces an immediate disconnect
    /// even if the transport has not noticed yet.
    NetworkOffline,
    /// Broadcast a status change (queued while not connected).
    UpdateStatus(UserStatus),
    /// Broadcast a position fix (queued while not connected).
    UpdatePosition(Position),
    /// Post a message to the group conversation (queued while not connected).
    SendGroupMessage { body: String },
    /// Send a message to one user (queued while not connected).
    SendPrivateMessage { to: UserId, body: String },
    /// Fetch one private conversation's history.  Only meaningful while
    /// connected; silently skipped otherwise (the UI re-requests on demand).
    RequestPrivateHistory(UserId),
    /// Empty both chat logs and persist the empty state.
    ClearHistory,
    /// Tear the session down: drop the transport, stop draining, end the
    /// task.  The replicas stay intact until explicitly cleared.
    Logout,
}

/// Configuration for spawning the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// First reconnect delay after a drop.
    pub reconnect_initial: Duration,
    /// Backoff cap.  The delay doubles per failed attempt up to this value;
    /// the number of attempts itself is unbounded.
    pub reconnect_max: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_secs(RECONNECT_INITIAL_SECS),
            reconnect_max: Duration::from_secs(RECONNECT_MAX_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running session.
///
/// The replicas handed out here are mutated only by the session task; the
/// mutex exists so other tasks can *read* them, not because there is a second
/// writer.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    presence: Arc<Mutex<PresenceStore>>,
    chat: Arc<Mutex<ChatStore>>,
}

impl SessionHandle {
    /// Hand a command to the session task.  Never errors: a command sent
    /// after logout is silently dropped.
    pub async fn command(&self, cmd: SessionCommand) {
        let _ = self.cmd_tx.send(cmd).await;
    }

    /// Current connection status, for display.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel for connectivity transitions.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Read access to the presence replica.
    pub fn presence(&self) -> Arc<Mutex<PresenceStore>> {
        self.presence.clone()
    }

    /// Read access to the chat replica.
    pub fn chat(&self) -> Arc<Mutex<ChatStore>> {
        self.chat.clone()
    }
}

/// Spawn the session event loop in a background tokio task.
///
/// Rehydrates both replicas and the offline queue from the database before
/// the first command is accepted, so callers see cached state immediately.
/// The session starts in `Idle` and does nothing until
/// [`SessionCommand::Connect`].
pub fn spawn_session<T: Transport>(
    config: SessionConfig,
    transport: T,
    local_user: UserState,
    db: Database,
) -> SessionHandle {
    let presence = Arc::new(Mutex::new(PresenceStore::rehydrate(
        local_user.id.clone(),
        db.clone(),
    )));
    let chat = Arc::new(Mutex::new(ChatStore::rehydrate(
        local_user.id.clone(),
        db.clone(),
    )));
    let queue = OfflineQueue::rehydrate(db);

    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(256);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);

    let task = SessionTask {
        config,
        transport,
        local_user,
        presence: presence.clone(),
        chat: chat.clone(),
        queue,
        cmd_rx,
        status_tx,
        link: None,
        synced: false,
        network_offline: false,
        backoff: Duration::ZERO,
        retry_at: None,
    };

    tokio::spawn(task.run());

    SessionHandle {
        cmd_tx,
        status_rx,
        presence,
        chat,
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// What the loop woke up for.
enum Step {
    Inbound(Option<ServerEvent>),
    Command(Option<SessionCommand>),
    Retry,
}

/// How one connect attempt ended.
enum ConnectOutcome {
    Finished(Result<TransportLink, crate::transport::TransportError>),
    WentOffline,
    Logout,
    Shutdown,
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Stop,
}

struct SessionTask<T: Transport> {
    config: SessionConfig,
    transport: T,
    local_user: UserState,
    presence: Arc<Mutex<PresenceStore>>,
    chat: Arc<Mutex<ChatStore>>,
    queue: OfflineQueue,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    status_tx: watch::Sender<ConnectionStatus>,

    /// The live link, `None` while disconnected.
    link: Option<TransportLink>,
    /// Whether the first snapshot since (re)connecting has been applied.
    /// Presence deltas arriving earlier would be applied against stale state
    /// and are discarded instead.
    synced: bool,
    /// Network-level offline signal is in effect: suppress retries until the
    /// matching online signal.
    network_offline: bool,
    backoff: Duration,
    retry_at: Option<Instant>,
}

impl<T: Transport> SessionTask<T> {
    async fn run(mut self) {
        self.backoff = self.config.reconnect_initial;
        info!("session task started");

        loop {
            match self.next_step().await {
                Step::Inbound(Some(event)) => self.route_event(event),
                Step::Inbound(None) => {
                    info!("transport dropped");
                    self.on_transport_drop();
                }
                Step::Command(Some(cmd)) => {
                    if self.handle_command(cmd).await == Flow::Stop {
                        break;
                    }
                }
                Step::Command(None) => {
                    // All handles dropped.
                    debug!("command channel closed, shutting down session");
                    break;
                }
                Step::Retry => {
                    if self.attempt_connect(ConnectionStatus::Reconnecting).await == Flow::Stop {
                        break;
                    }
                }
            }
        }

        info!("session task terminated");
    }

    /// Wait for the next thing to react to.  Which sources are armed depends
    /// on the lifecycle state: the inbound link while connected, the retry
    /// timer while a reconnect is scheduled, the command channel always.
    async fn next_step(&mut self) -> Step {
        match (&mut self.link, self.retry_at) {
            (Some(link), _) => tokio::select! {
                event = link.inbound.recv() => Step::Inbound(event),
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
            },
            (None, Some(at)) => tokio::select! {
                _ = time::sleep_until(at) => Step::Retry,
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
            },
            (None, None) => Step::Command(self.cmd_rx.recv().await),
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::Connect => {
                if self.link.is_none() && self.retry_at.is_none() {
                    return self.attempt_connect(ConnectionStatus::Connecting).await;
                }
            }
            SessionCommand::NetworkOnline => {
                self.network_offline = false;
                if self.link.is_none() {
                    self.retry_at = None;
                    return self.attempt_connect(ConnectionStatus::Reconnecting).await;
                }
            }
            SessionCommand::NetworkOffline => {
                info!("network offline signal, forcing disconnect");
                self.network_offline = true;
                self.retry_at = None;
                self.link = None;
                if self.status() != ConnectionStatus::Idle {
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
            SessionCommand::Logout => {
                info!("logout, tearing session down");
                self.link = None;
                self.retry_at = None;
                self.set_status(ConnectionStatus::Disconnected);
                return Flow::Stop;
            }
            other => self.handle_local_action(other),
        }
        Flow::Continue
    }

    /// Local user actions: mutations are transmitted immediately when
    /// connected and parked in the offline queue otherwise; fetches are
    /// connected-only.  Nothing here blocks or errors back to the caller.
    fn handle_local_action(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::UpdateStatus(status) => {
                self.send_or_enqueue(Operation::UpdateStatus { status });
            }
            SessionCommand::UpdatePosition(position) => {
                self.send_or_enqueue(Operation::UpdatePosition { position });
            }
            SessionCommand::SendGroupMessage { body } => {
                self.send_or_enqueue(Operation::SendGroupMessage { body });
            }
            SessionCommand::SendPrivateMessage { to, body } => {
                self.send_or_enqueue(Operation::SendPrivateMessage { to, body });
            }
            SessionCommand::RequestPrivateHistory(peer) => {
                if self.status() == ConnectionStatus::Connected {
                    if !self.send_now(ClientCommand::RequestPrivateHistory { peer }) {
                        self.on_transport_drop();
                    }
                } else {
                    debug!("not connected, skipping private history request");
                }
            }
            SessionCommand::ClearHistory => {
                self.lock_chat().clear_all();
            }
            // Control commands are handled in handle_command / attempt_connect.
            _ => {}
        }
    }

    /// One transport connect attempt, published as `via` (Connecting on an
    /// explicit connect, Reconnecting on retries and online signals).
    ///
    /// The command channel stays responsive during the attempt: an offline
    /// signal or logout aborts it, everything else is deferred until the
    /// attempt resolves and then replayed in order.
    async fn attempt_connect(&mut self, via: ConnectionStatus) -> Flow {
        self.retry_at = None;
        self.set_status(via);

        let mut deferred: Vec<SessionCommand> = Vec::new();
        let outcome = {
            let fut = self.transport.connect();
            tokio::pin!(fut);
            loop {
                tokio::select! {
                    res = &mut fut => break ConnectOutcome::Finished(res),
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(SessionCommand::NetworkOffline) => break ConnectOutcome::WentOffline,
                        Some(SessionCommand::Logout) => break ConnectOutcome::Logout,
                        Some(other) => deferred.push(other),
                        None => break ConnectOutcome::Shutdown,
                    }
                }
            }
        };

        match outcome {
            ConnectOutcome::Finished(Ok(link)) => {
                self.link = Some(link);
                self.on_connected();
            }
            ConnectOutcome::Finished(Err(e)) => {
                warn!(error = %e, "connect attempt failed, will retry");
                self.set_status(ConnectionStatus::Disconnected);
                self.schedule_retry();
            }
            ConnectOutcome::WentOffline => {
                info!("network offline signal during connect, aborting attempt");
                self.network_offline = true;
                self.set_status(ConnectionStatus::Disconnected);
            }
            ConnectOutcome::Logout => {
                info!("logout during connect, tearing session down");
                self.set_status(ConnectionStatus::Disconnected);
                return Flow::Stop;
            }
            ConnectOutcome::Shutdown => return Flow::Stop,
        }

        // Replay commands that arrived mid-attempt.  Connect / online are
        // no-ops here (an attempt just resolved; a failure already scheduled
        // its retry), so only local actions are meaningful.
        for cmd in deferred {
            self.handle_local_action(cmd);
        }
        Flow::Continue
    }

    /// Entering Connected: reset backoff, resynchronize, drain the queue,
    /// and only then publish Connected -- observers treat "connected" as
    /// "connected and queue-drain initiated".
    fn on_connected(&mut self) {
        self.backoff = self.config.reconnect_initial;
        self.synced = false;
        info!("connected to relay, starting resynchronization");

        // Register first so the relay can attribute everything that follows;
        // then exactly one snapshot request and one group-history request per
        // (re)connect.  Private histories are fetched lazily on demand.
        let sent = self.send_now(ClientCommand::Register(self.local_user.clone()))
            && self.send_now(ClientCommand::RequestSnapshot)
            && self.send_now(ClientCommand::RequestGroupHistory);
        if !sent {
            warn!("transport dropped during resynchronization");
            self.on_transport_drop();
            return;
        }

        self.drain_queue();
        if self.link.is_some() {
            self.set_status(ConnectionStatus::Connected);
        }
    }

    /// Transmit queued operations strictly head to tail, removing each entry
    /// only after its transmit call has been issued.  A drop mid-drain leaves
    /// the un-issued suffix in original order for the next drain.
    fn drain_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        info!(count = self.queue.len(), "draining offline queue");

        while let Some(queued) = self.queue.front() {
            let cmd = ClientCommand::from(queued.op.clone());
            if !self.send_now(cmd) {
                warn!(remaining = self.queue.len(), "transport dropped mid-drain");
                self.on_transport_drop();
                return;
            }
            self.queue.pop_issued();
        }
    }

    fn send_or_enqueue(&mut self, op: Operation) {
        if self.status() == ConnectionStatus::Connected {
            if self.send_now(ClientCommand::from(op.clone())) {
                return;
            }
            // The link died under us; fall through to queueing so the
            // operation is replayed on the next connect.
            self.on_transport_drop();
        }
        self.queue.enqueue(op);
    }

    /// Issue one command on the live link.  `false` means the link is dead.
    fn send_now(&mut self, cmd: ClientCommand) -> bool {
        match &self.link {
            Some(link) => link.outbound.send(cmd).is_ok(),
            None => false,
        }
    }

    fn on_transport_drop(&mut self) {
        self.link = None;
        self.set_status(ConnectionStatus::Disconnected);
        if self.network_offline {
            debug!("network is offline, waiting for online signal before retrying");
            return;
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.network_offline {
            return;
        }
        debug!(
            backoff_ms = self.backoff.as_millis() as u64,
            "scheduling reconnect"
        );
        self.retry_at = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(self.config.reconnect_max);
    }

    /// Pure fan-out of inbound relay events to the replicas.
    fn route_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Snapshot(users) => {
                self.lock_presence().apply_snapshot(users);
                self.synced = true;
            }
            ServerEvent::UserJoined(user) => {
                if self.synced {
                    self.lock_presence().apply_add(user);
                } else {
                    debug!("discarding presence delta received before first snapshot");
                }
            }
            ServerEvent::UserLeft(id) => {
                if self.synced {
                    self.lock_presence().apply_remove(&id);
                } else {
                    debug!("discarding presence delta received before first snapshot");
                }
            }
            ServerEvent::StatusChanged { id, status } => {
                if self.synced {
                    self.lock_presence()
                        .apply_update(&id, UserDelta::status(status));
                } else {
                    debug!("discarding presence delta received before first snapshot");
                }
            }
            ServerEvent::PositionChanged { id, position } => {
                if self.synced {
                    self.lock_presence()
                        .apply_update(&id, UserDelta::position(position));
                } else {
                    debug!("discarding presence delta received before first snapshot");
                }
            }
            ServerEvent::GroupMessage(message) => self.lock_chat().append_group(message),
            ServerEvent::PrivateMessage(message) => self.lock_chat().append_private(message),
            ServerEvent::GroupHistory(messages) => {
                self.lock_chat().replace_group_history(messages);
            }
            ServerEvent::PrivateHistory { peer, messages } => {
                self.lock_chat().replace_private_history(peer, messages);
            }
        }
    }

    fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        debug!(status = ?status, "connection status");
        self.status_tx.send_replace(status);
    }

    fn lock_presence(&self) -> MutexGuard<'_, PresenceStore> {
        self.presence.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_chat(&self) -> MutexGuard<'_, ChatStore> {
        self.chat.lock().unwrap_or_else(|p| p.into_inner())
    }
}
