//! Consumer callbacks for a subscription client.
//!
//! Provides callback-based hooks for change events and connection events:
//!
//! - [`on_insert`](SubscriptionHandlers::on_insert): a row was inserted
//! - [`on_update`](SubscriptionHandlers::on_update): a row was updated (new, old)
//! - [`on_delete`](SubscriptionHandlers::on_delete): a row was deleted
//! - [`on_broadcast`](SubscriptionHandlers::on_broadcast): out-of-band broadcast
//! - [`on_error`](SubscriptionHandlers::on_error): configuration, channel,
//!   retry-budget or handler failures
//! - [`on_connect`](SubscriptionHandlers::on_connect) /
//!   [`on_disconnect`](SubscriptionHandlers::on_disconnect): channel lifecycle
//!
//! Change handlers return a [`HandlerResult`]. An `Err` (or a panic) is caught
//! by the dispatcher and forwarded to `on_error`; it never reaches the
//! connection loop.
//!
//! # Example
//!
//! ```rust
//! use feed_link::SubscriptionHandlers;
//!
//! let handlers = SubscriptionHandlers::new()
//!     .on_insert(|row| {
//!         println!("inserted: {:?}", row);
//!         Ok(())
//!     })
//!     .on_delete(|old| {
//!         println!("deleted: {:?}", old.get("id"));
//!         Ok(())
//!     })
//!     .on_error(|err| eprintln!("feed error: {}", err));
//! assert!(handlers.has_any());
//! ```

use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use crate::error::FeedLinkError;
use crate::models::Row;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the channel went away.
    pub message: String,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Error type consumer callbacks may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of change and broadcast callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

pub type OnInsertCallback = Arc<dyn Fn(&Row) -> HandlerResult + Send + Sync>;

pub type OnUpdateCallback = Arc<dyn Fn(&Row, &Row) -> HandlerResult + Send + Sync>;

pub type OnDeleteCallback = Arc<dyn Fn(&Row) -> HandlerResult + Send + Sync>;

pub type OnBroadcastCallback = Arc<dyn Fn(&str, &JsonValue) -> HandlerResult + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(FeedLinkError) + Send + Sync>;

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Handler set registered at client construction.
///
/// All handlers are optional. Handlers are `Send + Sync` and run on the
/// client's connection task, in delivery order.
#[derive(Clone, Default)]
pub struct SubscriptionHandlers {
    pub(crate) on_insert: Option<OnInsertCallback>,
    pub(crate) on_update: Option<OnUpdateCallback>,
    pub(crate) on_delete: Option<OnDeleteCallback>,
    pub(crate) on_broadcast: Option<OnBroadcastCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
}

impl fmt::Debug for SubscriptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandlers")
            .field("on_insert", &self.on_insert.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_broadcast", &self.on_broadcast.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

impl SubscriptionHandlers {
    /// Create an empty handler set (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for inserted rows. Receives the new row.
    pub fn on_insert(mut self, f: impl Fn(&Row) -> HandlerResult + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(f));
        self
    }

    /// Register a callback for updated rows. Receives `(new, old)`.
    pub fn on_update(
        mut self,
        f: impl Fn(&Row, &Row) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Register a callback for deleted rows. Receives the old row.
    pub fn on_delete(mut self, f: impl Fn(&Row) -> HandlerResult + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(f));
        self
    }

    /// Register a callback for broadcasts. Receives `(event, payload)`.
    pub fn on_broadcast(
        mut self,
        f: impl Fn(&str, &JsonValue) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.on_broadcast = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every error routed to the caller.
    ///
    /// `NotConnected` is never routed here; it is returned directly from
    /// `send` / `track_presence`.
    pub fn on_error(mut self, f: impl Fn(FeedLinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the channel becomes subscribed.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a subscribed channel goes away.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_insert.is_some()
            || self.on_update.is_some()
            || self.on_delete.is_some()
            || self.on_broadcast.is_some()
            || self.on_error.is_some()
            || self.on_connect.is_some()
            || self.on_disconnect.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_error(&self, error: FeedLinkError) {
        if let Some(cb) = &self.on_error {
            guard_callback("on_error", || cb(error));
        }
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            guard_callback("on_connect", || cb());
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            guard_callback("on_disconnect", || cb(reason));
        }
    }
}

/// Run a notification callback, containing a panic to a log line.
fn guard_callback(name: &str, f: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        log::warn!(
            "[feed-link] {} callback panicked: {}",
            name,
            crate::dispatcher::panic_message(panic.as_ref())
        );
    }
}
