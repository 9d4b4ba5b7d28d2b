use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::operation::OperationKind;
use super::presence_state::PresenceMap;

/// A single row, keyed by column name.
pub type Row = HashMap<String, JsonValue>;

/// Row-level change delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Insert notification
    Insert {
        /// Inserted row
        record: Row,
    },

    /// Update notification
    Update {
        /// Row after the update
        record: Row,
        /// Row before the update (may be partial, e.g. key columns only)
        old_record: Row,
    },

    /// Delete notification
    Delete {
        /// Deleted row (may be partial, e.g. key columns only)
        old_record: Row,
    },
}

impl ChangeEvent {
    /// Operation kind of this change
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Insert { .. } => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// Presence update delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceMessage {
    /// Full presence state, replacing whatever the client knew
    Sync(PresenceMap),
    /// Incremental change
    Diff {
        /// Payloads that joined, per participant key
        joins: PresenceMap,
        /// Payloads that left, per participant key
        leaves: PresenceMap,
    },
}

/// Any message a channel can deliver after it is subscribed.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Row-level change
    Change(ChangeEvent),
    /// Out-of-band broadcast from another participant
    Broadcast {
        /// Application-defined event name
        event: String,
        /// Arbitrary payload
        payload: JsonValue,
    },
    /// Presence update
    Presence(PresenceMessage),
}

/// Message the client sends over an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Out-of-band broadcast
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
}

impl OutboundMessage {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Broadcast { .. } => "broadcast",
            Self::Heartbeat => "heartbeat",
            Self::PresenceTrack { .. } => "presence_track",
            Self::PresenceUntrack => "presence_untrack",
        }
    }
}
