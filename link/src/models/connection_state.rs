use crate::error::FeedLinkError;

use super::connection_status::ConnectionStatus;

/// Snapshot of a client's connection state.
///
/// Written only by the connection task; callers receive copies through
/// [`LiveFeedClient::state`](crate::LiveFeedClient::state) or
/// [`LiveFeedClient::watch_state`](crate::LiveFeedClient::watch_state).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    /// Current lifecycle status
    pub status: ConnectionStatus,
    /// Retries consumed in the current retry episode (reset on subscribe)
    pub retry_count: u32,
    /// Most recent failure, cleared on successful (re)connection
    pub last_error: Option<FeedLinkError>,
    /// Millis since Unix epoch of the last successfully sent heartbeat
    pub last_heartbeat_at_ms: Option<u64>,
    /// Delay of the armed retry timer, `None` when no retry is pending
    pub next_retry_delay_ms: Option<u64>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
