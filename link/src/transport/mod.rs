//! Transport channel contract.
//!
//! A [`Transport`] opens one [`Channel`] per connection attempt. The open
//! call returns immediately; the channel later reports exactly one terminal
//! [`ChannelStatus`] for the attempt (and possibly a second one, such as
//! `Error` or `Closed`, after `Subscribed`), plus any inbound messages,
//! through the [`ChannelSink`] it was given.
//!
//! Transports bound their own blocking work: a connect or join that takes
//! too long is reported as [`ChannelStatus::Timeout`], never polled for by
//! the connection manager.
//!
//! - [`websocket`]: JSON-over-WebSocket change-feed transport
//! - [`memory`]: in-process scripted transport

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{ChannelRequest, InboundMessage, OutboundMessage};

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// Terminal status a channel reports for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel joined successfully.
    Subscribed,
    /// The channel failed. Retryable.
    Error(String),
    /// Opening or joining took too long. Retryable.
    Timeout,
    /// The channel was closed without error. Not retried.
    Closed,
}

/// Something a channel pushes to its client.
#[derive(Debug, Clone)]
pub(crate) enum ChannelEvent {
    Status(ChannelStatus),
    Message(InboundMessage),
}

/// A channel event tagged with the generation of the channel that sent it.
#[derive(Debug)]
pub(crate) struct ChannelEnvelope {
    pub(crate) generation: u64,
    pub(crate) event: ChannelEvent,
}

/// Where a channel reports its status and inbound messages.
///
/// Every sink is bound to one channel generation; once the client replaces
/// or closes that channel, anything still sent through the sink is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    generation: u64,
    tx: mpsc::Sender<ChannelEnvelope>,
}

impl ChannelSink {
    pub(crate) fn new(generation: u64, tx: mpsc::Sender<ChannelEnvelope>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the channel this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a terminal status. Returns `false` if the client is gone.
    pub async fn report(&self, status: ChannelStatus) -> bool {
        self.push(ChannelEvent::Status(status)).await
    }

    /// Deliver an inbound message. Returns `false` if the client is gone.
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        self.push(ChannelEvent::Message(message)).await
    }

    /// Whether the receiving client has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait for room in the client's queue. Returns `None` if the client is
    /// gone. Dropping the future before it resolves sends nothing, so a
    /// transport can wait for room while also serving its own commands.
    pub(crate) async fn reserve(&self) -> Option<SinkPermit<'_>> {
        let permit = self.tx.reserve().await.ok()?;
        Some(SinkPermit {
            generation: self.generation,
            permit,
        })
    }

    async fn push(&self, event: ChannelEvent) -> bool {
        self.tx
            .send(ChannelEnvelope {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// A reserved slot in the client's queue for one event.
pub(crate) struct SinkPermit<'a> {
    generation: u64,
    permit: mpsc::Permit<'a, ChannelEnvelope>,
}

impl SinkPermit<'_> {
    pub(crate) fn send(self, event: ChannelEvent) {
        self.permit.send(ChannelEnvelope {
            generation: self.generation,
            event,
        });
    }
}

/// A single logical subscription against the transport.
///
/// Owned exclusively by the connection manager; dropped and replaced on
/// every reconnect.
#[async_trait]
pub trait Channel: Send {
    /// Transmit an outbound message. Must be bounded by the transport.
    async fn send(&mut self, message: OutboundMessage) -> Result<()>;

    /// Leave the channel. Must not report any further status.
    async fn close(&mut self);
}

/// Factory for channels.
pub trait Transport: Send + Sync {
    /// Request a channel for `request`. Must not block; the outcome is
    /// reported through `sink`.
    fn open(&self, request: ChannelRequest, sink: ChannelSink) -> Box<dyn Channel>;
}
