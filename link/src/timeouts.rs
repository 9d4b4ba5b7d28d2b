//! Timeout configuration for transport operations.
//!
//! The connection manager never polls for timeouts itself: a transport
//! bounds its own open and send calls and reports `Timeout` as a terminal
//! channel status. These values drive the bundled WebSocket transport.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout configuration for transport operations.
///
/// # Examples
///
/// ```rust
/// use feed_link::FeedLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = FeedLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = FeedLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .subscribe_timeout_secs(20)
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = FeedLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLinkTimeouts {
    /// Timeout for establishing the connection (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for the server to acknowledge the channel join.
    /// Default: 5 seconds
    pub subscribe_timeout: Duration,

    /// Timeout for writing a single outbound message.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Time allowed for a graceful close before the channel task is aborted.
    /// Default: 2 seconds
    pub close_timeout: Duration,
}

impl Default for FeedLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl FeedLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> FeedLinkTimeoutsBuilder {
        FeedLinkTimeoutsBuilder::new()
    }

    /// Create timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            subscribe_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_millis(500),
        }
    }

    /// Create timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(15),
            send_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Run `fut` under `limit`, unless `limit` means "no timeout".
///
/// Returns `None` when the limit elapsed.
pub(crate) async fn bounded<F: std::future::Future>(limit: Duration, fut: F) -> Option<F::Output> {
    if FeedLinkTimeouts::is_no_timeout(limit) {
        Some(fut.await)
    } else {
        tokio::time::timeout(limit, fut).await.ok()
    }
}

/// Builder for creating custom [`FeedLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct FeedLinkTimeoutsBuilder {
    timeouts: FeedLinkTimeouts,
}

impl FeedLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: FeedLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the channel-join acknowledgment timeout.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the channel-join acknowledgment timeout in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Set the send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the send timeout in seconds.
    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the graceful close timeout.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.close_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> FeedLinkTimeouts {
        self.timeouts
    }
}
