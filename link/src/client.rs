//! Public subscription client.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::connection::{ConnCmd, ConnectionManager, COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};
use crate::error::{FeedLinkError, Result};
use crate::event_handlers::SubscriptionHandlers;
use crate::models::{ConnectionState, ConnectionStatus, PresenceState, SubscriptionConfig};
use crate::signals::{ConnectivityAdapter, ConnectivitySource, LifecycleAdapter, LifecycleSource};
use crate::timeouts::FeedLinkTimeouts;
use crate::transport::{ChannelEnvelope, Transport, WebSocketTransport};

/// Resilient subscription to one change-feed resource.
///
/// Every client owns a background connection task that performs all state
/// transitions. The methods here send commands to that task and return
/// once it has applied them; state is read from a `watch` snapshot.
///
/// Use [`LiveFeedClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use feed_link::{LiveFeedClient, SubscriptionConfig, SubscriptionHandlers};
///
/// # async fn example() -> feed_link::Result<()> {
/// let client = LiveFeedClient::builder()
///     .config(SubscriptionConfig::new("messages").with_schema("chat"))
///     .websocket_url("ws://localhost:4000/feed")
///     .handlers(SubscriptionHandlers::new().on_insert(|row| {
///         println!("new message: {:?}", row);
///         Ok(())
///     }))
///     .build()?;
///
/// client.connect().await;
/// client.send("typing", serde_json::json!({"user": "alice"})).await?;
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct LiveFeedClient {
    config: SubscriptionConfig,
    cmd_tx: mpsc::Sender<ConnCmd>,
    state_rx: watch::Receiver<ConnectionState>,
    presence_rx: watch::Receiver<PresenceState>,
}

impl LiveFeedClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> LiveFeedClientBuilder {
        LiveFeedClientBuilder::new()
    }

    /// Open the channel if it is not already opening or open.
    ///
    /// Configuration problems are reported through `on_error` and
    /// [`last_error`](Self::last_error); the client never panics.
    pub async fn connect(&self) {
        self.request(|done_tx| ConnCmd::Connect { done_tx }).await;
    }

    /// Close the channel and cancel every timer. Safe from any state.
    ///
    /// When this returns, no retry or heartbeat can fire any more.
    pub async fn disconnect(&self) {
        self.request(|done_tx| ConnCmd::Disconnect { done_tx }).await;
    }

    /// Disconnect, then connect with a fresh retry budget.
    ///
    /// This is the only way out of
    /// [`MaxRetriesExceeded`](ConnectionStatus::MaxRetriesExceeded).
    pub async fn reconnect(&self) {
        self.request(|done_tx| ConnCmd::Reconnect { done_tx }).await;
    }

    /// Broadcast `payload` under `event` over the current channel.
    ///
    /// Fails with [`FeedLinkError::NotConnected`] unless connected.
    pub async fn send(&self, event: impl Into<String>, payload: JsonValue) -> Result<()> {
        let event = event.into();
        self.request(|result_tx| ConnCmd::Send {
            event,
            payload,
            result_tx,
        })
        .await
        .unwrap_or_else(|| Err(task_gone()))
    }

    /// Announce this client's presence. The payload is re-announced after
    /// every reconnect until [`untrack_presence`](Self::untrack_presence).
    ///
    /// Fails with [`FeedLinkError::NotConnected`] unless connected.
    pub async fn track_presence(&self, payload: JsonValue) -> Result<()> {
        self.request(|result_tx| ConnCmd::TrackPresence { payload, result_tx })
            .await
            .unwrap_or_else(|| Err(task_gone()))
    }

    /// Withdraw this client's presence.
    ///
    /// While not connected this only forgets the tracked payload.
    pub async fn untrack_presence(&self) -> Result<()> {
        self.request(|result_tx| ConnCmd::UntrackPresence { result_tx })
            .await
            .unwrap_or_else(|| Err(task_gone()))
    }

    /// Stop the connection task. The client is inert afterwards.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConnCmd::Shutdown {
                done_tx: Some(done_tx),
            })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    pub fn retry_count(&self) -> u32 {
        self.state_rx.borrow().retry_count
    }

    pub fn last_error(&self) -> Option<FeedLinkError> {
        self.state_rx.borrow().last_error.clone()
    }

    /// Time of the last successful heartbeat, in millis since Unix epoch.
    pub fn last_heartbeat_at_ms(&self) -> Option<u64> {
        self.state_rx.borrow().last_heartbeat_at_ms
    }

    /// Snapshot of who is present on the current channel.
    pub fn presence(&self) -> PresenceState {
        self.presence_rx.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to presence changes.
    pub fn watch_presence(&self) -> watch::Receiver<PresenceState> {
        self.presence_rx.clone()
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ConnCmd) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(build(tx)).await.is_err() {
            log::debug!("[feed-link] Connection task is not running");
            return None;
        }
        rx.await.ok()
    }
}

impl Drop for LiveFeedClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ConnCmd::Shutdown { done_tx: None });
    }
}

fn task_gone() -> FeedLinkError {
    FeedLinkError::InternalError("connection task is not running".to_string())
}

/// Builder for configuring [`LiveFeedClient`] instances.
pub struct LiveFeedClientBuilder {
    config: Option<SubscriptionConfig>,
    transport: Option<Arc<dyn Transport>>,
    websocket_url: Option<String>,
    timeouts: FeedLinkTimeouts,
    handlers: SubscriptionHandlers,
    connectivity: Option<Arc<dyn ConnectivitySource>>,
    lifecycle: Option<Arc<dyn LifecycleSource>>,
}

impl LiveFeedClientBuilder {
    fn new() -> Self {
        Self {
            config: None,
            transport: None,
            websocket_url: None,
            timeouts: FeedLinkTimeouts::default(),
            handlers: SubscriptionHandlers::default(),
            connectivity: None,
            lifecycle: None,
        }
    }

    /// Set the subscription configuration
    pub fn config(mut self, config: SubscriptionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom transport.
    ///
    /// Takes precedence over [`websocket_url`](Self::websocket_url).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connect through the bundled WebSocket transport.
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Set timeouts for the bundled WebSocket transport
    pub fn timeouts(mut self, timeouts: FeedLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the consumer callbacks
    pub fn handlers(mut self, handlers: SubscriptionHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Observe network reachability. Without a source the client assumes
    /// it is always online.
    pub fn connectivity(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.connectivity = Some(source);
        self
    }

    /// Observe app foreground/background transitions. Without a source the
    /// client assumes it is always in the foreground.
    pub fn lifecycle(mut self, source: Arc<dyn LifecycleSource>) -> Self {
        self.lifecycle = Some(source);
        self
    }

    /// Build the client and start its connection task.
    ///
    /// Must be called inside a Tokio runtime. The channel is not opened
    /// until [`LiveFeedClient::connect`].
    pub fn build(self) -> Result<LiveFeedClient> {
        let config = self.config.ok_or_else(|| {
            FeedLinkError::ConfigurationError("subscription config is required".to_string())
        })?;

        let transport: Arc<dyn Transport> = match (self.transport, self.websocket_url) {
            (Some(transport), _) => transport,
            (None, Some(url)) => Arc::new(WebSocketTransport::new(url, self.timeouts)),
            (None, None) => {
                return Err(FeedLinkError::ConfigurationError(
                    "a transport or websocket_url is required".to_string(),
                ))
            },
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            FeedLinkError::InternalError(format!("LiveFeedClient requires a Tokio runtime: {}", e))
        })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEnvelope>(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (presence_tx, presence_rx) = watch::channel(PresenceState::default());

        let manager = ConnectionManager::new(
            config.clone(),
            transport,
            self.handlers,
            ConnectivityAdapter::new(self.connectivity.as_deref()),
            LifecycleAdapter::new(self.lifecycle.as_deref()),
            state_tx,
            presence_tx,
            event_tx,
        );
        runtime.spawn(manager.run(cmd_rx, event_rx));

        log::debug!("[feed-link] Client built for {}", config.qualified_resource());

        Ok(LiveFeedClient {
            config,
            cmd_tx,
            state_rx,
            presence_rx,
        })
    }
}
