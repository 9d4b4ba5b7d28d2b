//! Per-client connection task.
//!
//! A single task owns every piece of mutable connection state:
//!
//! - the [`ConnectionState`] published to client handles through `watch`
//! - the one live channel handle, tagged with a generation number
//! - the retry timer ([`RetryScheduler`]) and the heartbeat timer
//!   ([`HeartbeatMonitor`])
//! - the connectivity and lifecycle adapters
//!
//! Commands, channel events, timer ticks and signals are all observed in one
//! `select!` loop, so transitions are totally ordered and no timer can fire
//! concurrently with a command. Events from a channel that is no longer the
//! current generation are dropped.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::connection::ConnCmd;
use crate::dispatcher::EventDispatcher;
use crate::error::{FeedLinkError, Result};
use crate::event_handlers::{DisconnectReason, SubscriptionHandlers};
use crate::heartbeat::HeartbeatMonitor;
use crate::models::{
    ChannelRequest, ConnectionState, ConnectionStatus, InboundMessage, OutboundMessage,
    PresenceMessage, PresenceState, SubscriptionConfig,
};
use crate::retry::{RetryDecision, RetryScheduler};
use crate::signals::{AppLifecycle, ConnectivityAdapter, LifecycleAdapter};
use crate::transport::{Channel, ChannelEnvelope, ChannelEvent, ChannelSink, ChannelStatus, Transport};

/// What woke the task up.
enum Wake {
    Command(ConnCmd),
    ClientGone,
    Channel(ChannelEnvelope),
    RetryDue,
    HeartbeatDue,
    Connectivity,
    Lifecycle,
}

pub(crate) struct ConnectionManager {
    config: SubscriptionConfig,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    presence: PresenceState,
    presence_tx: watch::Sender<PresenceState>,
    channel: Option<Box<dyn Channel>>,
    generation: u64,
    event_tx: mpsc::Sender<ChannelEnvelope>,
    retry: RetryScheduler,
    heartbeat: HeartbeatMonitor,
    connectivity: ConnectivityAdapter,
    lifecycle: LifecycleAdapter,
    /// Whether the caller currently wants a connection.
    desired: bool,
    /// Presence payload to re-announce after every subscribe.
    tracked: Option<JsonValue>,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SubscriptionConfig,
        transport: Arc<dyn Transport>,
        handlers: SubscriptionHandlers,
        connectivity: ConnectivityAdapter,
        lifecycle: LifecycleAdapter,
        state_tx: watch::Sender<ConnectionState>,
        presence_tx: watch::Sender<PresenceState>,
        event_tx: mpsc::Sender<ChannelEnvelope>,
    ) -> Self {
        let dispatcher = EventDispatcher::new(config.events, handlers);
        let retry = RetryScheduler::new(config.retry_policy);
        Self {
            config,
            transport,
            dispatcher,
            state: ConnectionState::default(),
            state_tx,
            presence: PresenceState::new(),
            presence_tx,
            channel: None,
            generation: 0,
            event_tx,
            retry,
            heartbeat: HeartbeatMonitor::new(),
            connectivity,
            lifecycle,
            desired: false,
            tracked: None,
        }
    }

    /// Run until shutdown or until every client handle is gone.
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ConnCmd>,
        mut event_rx: mpsc::Receiver<ChannelEnvelope>,
    ) {
        log::debug!(
            "[feed-link] Connection task started for {}",
            self.config.qualified_resource()
        );

        loop {
            let wake = tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => Wake::ClientGone,
                },
                Some(envelope) = event_rx.recv() => Wake::Channel(envelope),
                _ = self.retry.fired() => Wake::RetryDue,
                _ = self.heartbeat.tick() => Wake::HeartbeatDue,
                _ = self.connectivity.changed() => Wake::Connectivity,
                _ = self.lifecycle.changed() => Wake::Lifecycle,
            };

            match wake {
                Wake::Command(ConnCmd::Shutdown { done_tx }) => {
                    self.teardown().await;
                    if let Some(tx) = done_tx {
                        let _ = tx.send(());
                    }
                    break;
                },
                Wake::ClientGone => {
                    self.teardown().await;
                    break;
                },
                Wake::Command(cmd) => self.handle_command(cmd).await,
                Wake::Channel(envelope) => self.handle_channel_event(envelope).await,
                Wake::RetryDue => self.handle_retry_due().await,
                Wake::HeartbeatDue => self.handle_heartbeat().await,
                Wake::Connectivity => {
                    if let Some(online) = self.connectivity.observe() {
                        if online {
                            self.handle_online().await;
                        } else {
                            self.handle_offline().await;
                        }
                    }
                },
                Wake::Lifecycle => match self.lifecycle.observe() {
                    Some(AppLifecycle::Foreground) => self.handle_foreground().await,
                    Some(AppLifecycle::Background) => self.handle_background().await,
                    Some(AppLifecycle::Inactive) | None => {},
                },
            }
        }

        log::debug!(
            "[feed-link] Connection task stopped for {}",
            self.config.qualified_resource()
        );
    }

    // ── Commands ────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: ConnCmd) {
        match cmd {
            ConnCmd::Connect { done_tx } => {
                self.connect().await;
                let _ = done_tx.send(());
            },
            ConnCmd::Disconnect { done_tx } => {
                self.disconnect().await;
                let _ = done_tx.send(());
            },
            ConnCmd::Reconnect { done_tx } => {
                log::info!("[feed-link] Reconnect requested");
                self.disconnect().await;
                self.connect().await;
                let _ = done_tx.send(());
            },
            ConnCmd::Send {
                event,
                payload,
                result_tx,
            } => {
                let result = self
                    .send_outbound(OutboundMessage::Broadcast { event, payload })
                    .await;
                let _ = result_tx.send(result);
            },
            ConnCmd::TrackPresence { payload, result_tx } => {
                let result = self
                    .send_outbound(OutboundMessage::PresenceTrack {
                        payload: payload.clone(),
                    })
                    .await;
                if result.is_ok() {
                    self.tracked = Some(payload);
                }
                let _ = result_tx.send(result);
            },
            ConnCmd::UntrackPresence { result_tx } => {
                let was_tracked = self.tracked.take().is_some();
                let result = if self.state.status == ConnectionStatus::Connected {
                    self.send_outbound(OutboundMessage::PresenceUntrack).await
                } else {
                    if was_tracked {
                        log::debug!("[feed-link] Dropped tracked presence while not connected");
                    }
                    Ok(())
                };
                let _ = result_tx.send(result);
            },
            ConnCmd::Shutdown { .. } => {},
        }
    }

    async fn connect(&mut self) {
        match self.state.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                log::debug!("[feed-link] connect() ignored: already {}", self.state.status);
                return;
            },
            ConnectionStatus::MaxRetriesExceeded => {
                log::debug!("[feed-link] connect() ignored: retries exhausted, use reconnect()");
                return;
            },
            _ => {},
        }

        if let Err(e) = self.check_config() {
            log::warn!("[feed-link] Cannot connect: {}", e);
            self.state.last_error = Some(e.clone());
            self.publish_state();
            self.handlers().emit_error(e);
            return;
        }

        self.desired = true;

        if !self.connectivity.is_online() {
            log::info!("[feed-link] connect() while offline; waiting for network");
            self.retry.cancel();
            self.state.status = ConnectionStatus::NetworkDisconnected;
            self.state.last_error = Some(FeedLinkError::NetworkUnavailable);
            self.state.next_retry_delay_ms = None;
            self.publish_state();
            return;
        }

        self.open_channel().await;
    }

    async fn disconnect(&mut self) {
        self.desired = false;
        let was_connected = self.state.status == ConnectionStatus::Connected;
        self.retry.cancel();
        self.heartbeat.stop();
        self.close_channel().await;
        self.clear_presence();

        self.state.status = ConnectionStatus::Disconnected;
        self.state.retry_count = 0;
        self.state.next_retry_delay_ms = None;
        self.publish_state();

        if was_connected {
            log::info!("[feed-link] Disconnected from {}", self.config.qualified_resource());
            self.handlers()
                .emit_disconnect(DisconnectReason::new("Client disconnected"));
        }
    }

    async fn teardown(&mut self) {
        if self.channel.is_some() || self.retry.is_pending() || self.heartbeat.is_active() {
            self.disconnect().await;
        }
    }

    async fn send_outbound(&mut self, message: OutboundMessage) -> Result<()> {
        let channel = match (self.state.status, self.channel.as_mut()) {
            (ConnectionStatus::Connected, Some(channel)) => channel,
            (status, _) => {
                return Err(FeedLinkError::NotConnected {
                    status: status.to_string(),
                })
            },
        };
        let label = message.label();
        channel.send(message).await.map_err(|e| {
            log::debug!("[feed-link] {} send failed: {}", label, e);
            e
        })
    }

    // ── Channel lifecycle ───────────────────────────────────────────────────

    fn check_config(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(FeedLinkError::ConfigurationError(
                "subscription is disabled".to_string(),
            ));
        }
        self.config.validate()
    }

    /// Replace the current channel (if any) with a freshly opened one.
    async fn open_channel(&mut self) {
        self.retry.cancel();
        self.heartbeat.stop();
        self.close_channel().await;
        self.clear_presence();

        self.generation += 1;
        let request = ChannelRequest::from(&self.config);
        log::info!(
            "[feed-link] Opening channel {} (generation {}, retry {})",
            request.topic(),
            self.generation,
            self.state.retry_count
        );
        let sink = ChannelSink::new(self.generation, self.event_tx.clone());
        self.channel = Some(self.transport.open(request, sink));

        self.state.status = ConnectionStatus::Connecting;
        self.state.next_retry_delay_ms = None;
        self.publish_state();
    }

    async fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            log::debug!("[feed-link] Closing channel generation {}", self.generation);
            channel.close().await;
        }
    }

    async fn handle_channel_event(&mut self, envelope: ChannelEnvelope) {
        if self.channel.is_none() || envelope.generation != self.generation {
            log::debug!(
                "[feed-link] Ignoring event from stale channel generation {} (current {})",
                envelope.generation,
                self.generation
            );
            return;
        }

        match envelope.event {
            ChannelEvent::Status(ChannelStatus::Subscribed) => self.handle_subscribed().await,
            ChannelEvent::Status(ChannelStatus::Error(reason)) => {
                self.handle_failure(ConnectionStatus::Error, FeedLinkError::ChannelError(reason))
                    .await
            },
            ChannelEvent::Status(ChannelStatus::Timeout) => {
                self.handle_failure(
                    ConnectionStatus::Timeout,
                    FeedLinkError::TimeoutError("channel did not open in time".to_string()),
                )
                .await
            },
            ChannelEvent::Status(ChannelStatus::Closed) => self.handle_closed().await,
            ChannelEvent::Message(message) => self.handle_message(message),
        }
    }

    async fn handle_subscribed(&mut self) {
        if self.state.status != ConnectionStatus::Connecting {
            log::debug!(
                "[feed-link] Ignoring subscribed status while {}",
                self.state.status
            );
            return;
        }

        self.state.status = ConnectionStatus::Connected;
        self.state.retry_count = 0;
        self.state.last_error = None;
        self.state.next_retry_delay_ms = None;
        self.heartbeat.start(self.config.heartbeat_interval());
        self.publish_state();
        log::info!("[feed-link] Subscribed to {}", self.config.qualified_resource());
        self.handlers().emit_connect();

        if let Some(payload) = self.tracked.clone() {
            if let Some(channel) = self.channel.as_mut() {
                if let Err(e) = channel.send(OutboundMessage::PresenceTrack { payload }).await {
                    log::debug!("[feed-link] Failed to re-announce presence: {}", e);
                }
            }
        }
    }

    async fn handle_failure(&mut self, status: ConnectionStatus, error: FeedLinkError) {
        let was_connected = self.state.status == ConnectionStatus::Connected;
        log::warn!("[feed-link] Channel failed: {}", error);

        self.heartbeat.stop();
        self.close_channel().await;

        self.state.status = status;
        self.state.last_error = Some(error.clone());
        self.publish_state();
        self.handlers().emit_error(error.clone());
        if was_connected {
            self.handlers()
                .emit_disconnect(DisconnectReason::new(error.to_string()));
        }

        self.schedule_retry();
    }

    async fn handle_closed(&mut self) {
        let was_connected = self.state.status == ConnectionStatus::Connected;
        log::info!("[feed-link] Channel closed by transport; not retrying");

        self.desired = false;
        self.retry.cancel();
        self.heartbeat.stop();
        self.close_channel().await;

        self.state.status = ConnectionStatus::Disconnected;
        self.state.retry_count = 0;
        self.state.next_retry_delay_ms = None;
        self.publish_state();

        if was_connected {
            self.handlers()
                .emit_disconnect(DisconnectReason::new("Channel closed"));
        }
    }

    fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Change(event) => {
                self.dispatcher.dispatch(&event);
            },
            InboundMessage::Broadcast { event, payload } => {
                self.dispatcher.dispatch_broadcast(&event, &payload);
            },
            InboundMessage::Presence(PresenceMessage::Sync(state)) => {
                self.presence.sync(state);
                self.publish_presence();
            },
            InboundMessage::Presence(PresenceMessage::Diff { joins, leaves }) => {
                self.presence.apply_diff(joins, leaves);
                self.publish_presence();
            },
        }
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    fn schedule_retry(&mut self) {
        match self.retry.schedule_retry(self.state.retry_count) {
            RetryDecision::Scheduled { delay } => {
                log::info!(
                    "[feed-link] Retrying in {:?} (attempt {}/{})",
                    delay,
                    self.state.retry_count + 1,
                    self.retry.policy().max_attempts
                );
                self.state.status = ConnectionStatus::Retrying;
                self.state.next_retry_delay_ms = self
                    .retry
                    .pending_delay()
                    .map(|armed| armed.as_millis().min(u128::from(u64::MAX)) as u64);
                self.publish_state();
            },
            RetryDecision::Exhausted { max_attempts } => {
                log::warn!("[feed-link] Max reconnection attempts ({}) reached", max_attempts);
                let error = FeedLinkError::MaxRetriesExceeded {
                    attempts: max_attempts,
                };
                self.state.status = ConnectionStatus::MaxRetriesExceeded;
                self.state.last_error = Some(error.clone());
                self.state.next_retry_delay_ms = None;
                self.publish_state();
                self.handlers().emit_error(error);
            },
        }
    }

    async fn handle_retry_due(&mut self) {
        if self.state.status != ConnectionStatus::Retrying {
            log::debug!("[feed-link] Retry timer fired while {}", self.state.status);
            return;
        }
        self.state.retry_count = self.state.retry_count.saturating_add(1);
        self.open_channel().await;
    }

    async fn handle_heartbeat(&mut self) {
        if self.state.status != ConnectionStatus::Connected {
            return;
        }
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if self.heartbeat.beat(channel.as_mut()).await {
            self.state.last_heartbeat_at_ms = self.heartbeat.last_beat_at_ms();
            self.publish_state();
        }
    }

    // ── Signals ─────────────────────────────────────────────────────────────

    /// Whether a signal should bring the channel back.
    fn should_resume(&self) -> bool {
        self.desired
            && self.config.enabled
            && self.connectivity.is_online()
            && self.lifecycle.is_foreground()
            && matches!(
                self.state.status,
                ConnectionStatus::Disconnected | ConnectionStatus::NetworkDisconnected
            )
    }

    async fn handle_offline(&mut self) {
        log::info!("[feed-link] Network went offline");
        if !self.desired || self.state.status == ConnectionStatus::MaxRetriesExceeded {
            return;
        }
        let was_connected = self.state.status == ConnectionStatus::Connected;

        self.retry.cancel();
        self.heartbeat.stop();
        self.close_channel().await;

        self.state.status = ConnectionStatus::NetworkDisconnected;
        self.state.last_error = Some(FeedLinkError::NetworkUnavailable);
        self.state.next_retry_delay_ms = None;
        self.publish_state();

        if was_connected {
            self.handlers()
                .emit_disconnect(DisconnectReason::new("Network unavailable"));
        }
    }

    async fn handle_online(&mut self) {
        log::info!("[feed-link] Network came back online");
        if self.should_resume() {
            self.open_channel().await;
        }
    }

    async fn handle_background(&mut self) {
        log::info!("[feed-link] App moved to background");
        if matches!(
            self.state.status,
            ConnectionStatus::Disconnected | ConnectionStatus::MaxRetriesExceeded
        ) {
            return;
        }
        let was_connected = self.state.status == ConnectionStatus::Connected;

        self.retry.cancel();
        self.heartbeat.stop();
        self.close_channel().await;

        self.state.status = ConnectionStatus::Disconnected;
        self.state.next_retry_delay_ms = None;
        self.publish_state();

        if was_connected {
            self.handlers()
                .emit_disconnect(DisconnectReason::new("App moved to background"));
        }
    }

    async fn handle_foreground(&mut self) {
        log::info!("[feed-link] App returned to foreground");
        if self.should_resume() {
            self.open_channel().await;
        }
    }

    // ── Publishing ──────────────────────────────────────────────────────────

    fn handlers(&self) -> &SubscriptionHandlers {
        self.dispatcher.handlers()
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn clear_presence(&mut self) {
        if !self.presence.is_empty() {
            self.presence.clear();
            self.publish_presence();
        }
    }

    fn publish_presence(&self) {
        self.presence_tx.send_replace(self.presence.clone());
    }
}
