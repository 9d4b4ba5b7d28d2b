//! In-process scripted transport.
//!
//! `MemoryTransport` records every open, outbound message and close, and
//! lets the owner drive the most recent channel by injecting statuses and
//! inbound messages. Clones share state, so a test keeps one clone while
//! the client owns another.
//!
//! ```rust
//! use feed_link::transport::{ChannelStatus, MemoryTransport};
//!
//! // Every open is answered with `Subscribed` right away.
//! let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
//! assert_eq!(transport.open_count(), 0);
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::error::{FeedLinkError, Result};
use crate::models::{ChannelRequest, InboundMessage, OutboundMessage};

use super::{Channel, ChannelSink, ChannelStatus, Transport};

/// One recorded channel open.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    /// Request the client opened the channel with
    pub request: ChannelRequest,
    /// Generation assigned by the client
    pub generation: u64,
    /// When the open happened (tokio clock, so it follows paused time)
    pub opened_at: Instant,
    /// Whether the client has closed this channel
    pub closed: bool,
    sink: ChannelSink,
}

/// One recorded outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct SentRecord {
    /// Generation of the channel it was sent on
    pub generation: u64,
    /// The message
    pub message: OutboundMessage,
}

#[derive(Debug, Default)]
struct MemoryState {
    opens: Vec<OpenRecord>,
    sent: Vec<SentRecord>,
    auto_reply: Option<ChannelStatus>,
    fail_sends: Option<String>,
}

/// Scripted transport for tests and in-process embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every future open with `status` immediately.
    pub fn with_auto_reply(self, status: ChannelStatus) -> Self {
        self.set_auto_reply(Some(status));
        self
    }

    /// Change (or clear) the automatic reply to future opens.
    pub fn set_auto_reply(&self, status: Option<ChannelStatus>) {
        self.lock().auto_reply = status;
    }

    /// Make every send fail with `reason` (`None` restores success).
    pub fn set_fail_sends(&self, reason: Option<String>) {
        self.lock().fail_sends = reason;
    }

    /// Number of channels ever opened.
    pub fn open_count(&self) -> usize {
        self.lock().opens.len()
    }

    /// Number of opened channels the client has not closed.
    pub fn live_channel_count(&self) -> usize {
        self.lock().opens.iter().filter(|o| !o.closed).count()
    }

    /// Every recorded open, oldest first.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.lock().opens.clone()
    }

    /// Every successfully sent message, oldest first.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.lock().sent.clone()
    }

    /// Number of heartbeats sent so far.
    pub fn heartbeat_count(&self) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|s| s.message == OutboundMessage::Heartbeat)
            .count()
    }

    /// Report `status` on the most recent channel.
    ///
    /// Returns `false` if there is no open channel or the client is gone.
    pub async fn report(&self, status: ChannelStatus) -> bool {
        match self.latest_live_sink() {
            Some(sink) => sink.report(status).await,
            None => false,
        }
    }

    /// Deliver an inbound message on the most recent channel.
    ///
    /// Returns `false` if there is no open channel or the client is gone.
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        match self.latest_live_sink() {
            Some(sink) => sink.deliver(message).await,
            None => false,
        }
    }

    fn latest_live_sink(&self) -> Option<ChannelSink> {
        self.lock()
            .opens
            .last()
            .filter(|o| !o.closed)
            .map(|o| o.sink.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn open(&self, request: ChannelRequest, sink: ChannelSink) -> Box<dyn Channel> {
        let generation = sink.generation();
        let auto_reply = {
            let mut state = self.lock();
            state.opens.push(OpenRecord {
                request,
                generation,
                opened_at: Instant::now(),
                closed: false,
                sink: sink.clone(),
            });
            state.auto_reply.clone()
        };

        if let Some(status) = auto_reply {
            tokio::spawn(async move {
                sink.report(status).await;
            });
        }

        Box::new(MemoryChannel {
            generation,
            state: self.state.clone(),
        })
    }
}

struct MemoryChannel {
    generation: u64,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChannel {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        let mut state = self.lock();
        let closed = state
            .opens
            .iter()
            .find(|o| o.generation == self.generation)
            .map_or(true, |o| o.closed);
        if closed {
            return Err(FeedLinkError::ChannelError("channel is closed".to_string()));
        }
        if let Some(reason) = &state.fail_sends {
            return Err(FeedLinkError::ChannelError(reason.clone()));
        }
        state.sent.push(SentRecord {
            generation: self.generation,
            message,
        });
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.lock();
        if let Some(open) = state.opens.iter_mut().find(|o| o.generation == self.generation) {
            open.closed = true;
        }
    }
}
