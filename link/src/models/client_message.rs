use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::change_event::OutboundMessage;
use super::channel_request::ChannelRequest;

/// Client-to-server frames of the WebSocket transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a channel
    ///
    /// Sent immediately after the WebSocket handshake. The server answers
    /// with `subscribed` or `error`.
    Subscribe {
        /// Channel scope, including the event mask
        channel: ChannelRequest,
    },

    /// Out-of-band broadcast to the other participants
    Broadcast {
        /// Application-defined event name
        event: String,
        /// Arbitrary payload
        payload: JsonValue,
    },

    /// Liveness ping
    Heartbeat,

    /// Announce this client's presence payload
    PresenceTrack {
        /// Presence payload
        payload: JsonValue,
    },

    /// Withdraw this client's presence
    PresenceUntrack,

    /// Leave the channel
    Unsubscribe,
}

impl From<OutboundMessage> for ClientMessage {
    fn from(message: OutboundMessage) -> Self {
        match message {
            OutboundMessage::Broadcast { event, payload } => Self::Broadcast { event, payload },
            OutboundMessage::Heartbeat => Self::Heartbeat,
            OutboundMessage::PresenceTrack { payload } => Self::PresenceTrack { payload },
            OutboundMessage::PresenceUntrack => Self::PresenceUntrack,
        }
    }
}
