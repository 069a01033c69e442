/// Maximum retained group chat messages
pub const GROUP_HISTORY_LIMIT: usize = 1000;

/// Maximum retained messages per private conversation
pub const PRIVATE_HISTORY_LIMIT: usize = 100;

/// Transport handshake timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// WebSocket keepalive ping interval in seconds
pub const PING_INTERVAL_SECS: u64 = 25;

/// Initial reconnect backoff in seconds (doubles per failed attempt)
pub const RECONNECT_INITIAL_SECS: u64 = 1;

/// Reconnect backoff cap in seconds (retries themselves are unbounded)
pub const RECONNECT_MAX_SECS: u64 = 5;

/// Cache record key for the presence snapshot
pub const RECORD_PRESENCE: &str = "presence.users";

/// Cache record key for the group chat log
pub const RECORD_CHAT_GROUP: &str = "chat.group";

/// Cache record key for the private chat logs (map keyed by peer id)
pub const RECORD_CHAT_PRIVATE: &str = "chat.private";
