//! Data models for the feed-link client library.
//!
//! Defines the subscription configuration, the observable connection
//! state, change/presence payloads and the WebSocket wire frames.

pub mod change_event;
pub mod channel_request;
pub mod client_message;
pub mod connection_state;
pub mod connection_status;
pub mod filter;
pub mod operation;
pub mod presence_state;
pub mod retry_policy;
pub mod server_message;
pub mod subscription_config;


pub use change_event::{ChangeEvent, InboundMessage, OutboundMessage, PresenceMessage, Row};
pub use channel_request::ChannelRequest;
pub use client_message::ClientMessage;
pub use connection_state::ConnectionState;
pub use connection_status::ConnectionStatus;
pub use filter::EqFilter;
pub use operation::{EventMask, OperationKind};
pub use presence_state::{PresenceMap, PresenceState};
pub use retry_policy::RetryPolicy;
pub use server_message::ServerMessage;
pub use subscription_config::SubscriptionConfig;
