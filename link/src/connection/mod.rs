//! Connection management.
//!
//! This module contains:
//! - [`manager`]: the per-client connection task that owns the state
//!   machine, the channel handle, the retry timer and the heartbeat timer
//!
//! The public [`LiveFeedClient`](crate::LiveFeedClient) talks to the task
//! only through [`ConnCmd`] messages.

pub(crate) mod manager;

use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

use crate::error::Result;

pub(crate) use manager::ConnectionManager;

/// Capacity of the command channel from client handles to the task.
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the channel transports push statuses and messages into.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    Connect {
        done_tx: oneshot::Sender<()>,
    },
    Disconnect {
        done_tx: oneshot::Sender<()>,
    },
    Reconnect {
        done_tx: oneshot::Sender<()>,
    },
    Send {
        event: String,
        payload: JsonValue,
        result_tx: oneshot::Sender<Result<()>>,
    },
    TrackPresence {
        payload: JsonValue,
        result_tx: oneshot::Sender<Result<()>>,
    },
    UntrackPresence {
        result_tx: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done_tx: Option<oneshot::Sender<()>>,
    },
}
