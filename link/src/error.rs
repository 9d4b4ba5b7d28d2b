//! Error types for feed-link.

use thiserror::Error;

/// Errors produced by the subscription client.
///
/// Errors are `Clone` so the most recent one can be kept in
/// [`ConnectionState::last_error`](crate::models::ConnectionState) and
/// handed to every `on_error` callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedLinkError {
    /// Invalid or disabled configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The transport reported an error for the channel. Retried.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The transport reported a timeout for the channel. Retried.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Connectivity was lost. Does not consume retry budget.
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// `send` / `track_presence` was called while not connected.
    #[error("Not connected (status: {status})")]
    NotConnected {
        /// Status at the time of the call.
        status: String,
    },

    /// The retry budget is exhausted; only `reconnect()` leaves this state.
    #[error("Max reconnection attempts ({attempts}) reached")]
    MaxRetriesExceeded {
        /// Configured attempt limit.
        attempts: u32,
    },

    /// A consumer callback returned an error or panicked.
    #[error("Handler error in {handler}: {message}")]
    HandlerError {
        /// Name of the failing handler (`on_insert`, `on_update`, ...).
        handler: &'static str,
        /// Error or panic message.
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FeedLinkError {
    /// Whether the retry loop may recover from this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChannelError(_) | Self::TimeoutError(_) | Self::WebSocketError(_))
    }
}

impl From<serde_json::Error> for FeedLinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Result type for feed-link operations.
pub type Result<T> = std::result::Result<T, FeedLinkError>;
