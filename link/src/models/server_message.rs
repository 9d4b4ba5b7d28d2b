use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::change_event::{ChangeEvent, InboundMessage, PresenceMessage, Row};
use super::operation::OperationKind;
use super::presence_state::PresenceMap;

/// Server-to-client frames of the WebSocket transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The channel join succeeded
    Subscribed,

    /// The channel failed
    Error {
        /// Human-readable reason
        message: String,
    },

    /// Row-level change notification
    Change {
        /// Kind of change
        operation: OperationKind,

        /// New row values (INSERT and UPDATE)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record: Option<Row>,

        /// Previous row values (UPDATE and DELETE)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_record: Option<Row>,
    },

    /// Broadcast from another participant
    Broadcast {
        /// Application-defined event name
        event: String,
        /// Arbitrary payload
        #[serde(default)]
        payload: JsonValue,
    },

    /// Full presence snapshot
    PresenceState {
        /// Payloads per participant key
        state: PresenceMap,
    },

    /// Incremental presence change
    PresenceDiff {
        /// Participants that joined
        #[serde(default)]
        joins: PresenceMap,
        /// Participants that left
        #[serde(default)]
        leaves: PresenceMap,
    },
}

impl ServerMessage {
    /// Convert a post-subscription frame into an inbound message.
    ///
    /// Returns `None` for control frames (`subscribed`, `error`) and for
    /// change frames missing the row their operation requires.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        match self {
            ServerMessage::Change {
                operation,
                record,
                old_record,
            } => {
                let event = match operation {
                    OperationKind::Insert => ChangeEvent::Insert { record: record? },
                    OperationKind::Update => ChangeEvent::Update {
                        record: record?,
                        old_record: old_record.unwrap_or_default(),
                    },
                    OperationKind::Delete => ChangeEvent::Delete {
                        old_record: old_record?,
                    },
                };
                Some(InboundMessage::Change(event))
            },
            ServerMessage::Broadcast { event, payload } => {
                Some(InboundMessage::Broadcast { event, payload })
            },
            ServerMessage::PresenceState { state } => {
                Some(InboundMessage::Presence(PresenceMessage::Sync(state)))
            },
            ServerMessage::PresenceDiff { joins, leaves } => {
                Some(InboundMessage::Presence(PresenceMessage::Diff { joins, leaves }))
            },
            ServerMessage::Subscribed | ServerMessage::Error { .. } => None,
        }
    }
}
