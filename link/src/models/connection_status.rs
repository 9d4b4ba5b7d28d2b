use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a subscription client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Initial state, and the state after `disconnect()` or backgrounding.
    #[default]
    Disconnected,
    /// A channel open has been requested and not yet confirmed.
    Connecting,
    /// The channel is subscribed.
    Connected,
    /// A retry timer is armed.
    Retrying,
    /// The transport reported an error.
    Error,
    /// The transport reported a timeout.
    Timeout,
    /// Connectivity is lost; reconnection resumes when it returns.
    NetworkDisconnected,
    /// Retry budget exhausted. Terminal until `reconnect()`.
    MaxRetriesExceeded,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Retrying => "retrying",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Timeout => "timeout",
            ConnectionStatus::NetworkDisconnected => "network_disconnected",
            ConnectionStatus::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }

    /// Whether an open attempt is in flight or established.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }

    /// Whether no automatic transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::MaxRetriesExceeded)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
