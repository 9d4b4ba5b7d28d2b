//! # feed-link
//!
//! Resilient realtime subscription client for row-level change feeds.
//!
//! A [`LiveFeedClient`] keeps one channel open against a resource (optionally
//! schema-qualified and filtered by a single equality predicate), routes
//! inserts, updates and deletes to typed callbacks, and keeps the channel
//! alive through errors, timeouts, network loss and app backgrounding:
//!
//! - exponential-backoff retries with a bounded budget ([`RetryScheduler`])
//! - periodic liveness pings while connected ([`HeartbeatMonitor`])
//! - reachability and lifecycle signals ([`signals`])
//! - broadcast and presence over the same channel
//!
//! The wire is pluggable through [`transport::Transport`]; a JSON
//! WebSocket transport and an in-process [`MemoryTransport`] are bundled.
//!
//! # Example
//!
//! ```rust,no_run
//! use feed_link::{EqFilter, EventMask, LiveFeedClient, OperationKind, SubscriptionConfig, SubscriptionHandlers};
//!
//! # async fn example() -> feed_link::Result<()> {
//! let config = SubscriptionConfig::new("orders")
//!     .with_schema("shop")
//!     .with_filter(EqFilter::new("customer_id", 42))
//!     .with_events(EventMask::only(&[OperationKind::Insert, OperationKind::Update]));
//!
//! let client = LiveFeedClient::builder()
//!     .config(config)
//!     .websocket_url("ws://localhost:4000/feed")
//!     .handlers(
//!         SubscriptionHandlers::new()
//!             .on_insert(|row| {
//!                 println!("new order {:?}", row.get("id"));
//!                 Ok(())
//!             })
//!             .on_error(|err| eprintln!("feed error: {}", err)),
//!     )
//!     .build()?;
//!
//! client.connect().await;
//! let mut state = client.watch_state();
//! while state.changed().await.is_ok() {
//!     println!("status: {}", state.borrow().status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub(crate) mod connection;
pub mod dispatcher;
pub mod error;
pub mod event_handlers;
pub mod heartbeat;
pub mod models;
pub mod retry;
pub mod signals;
pub mod timeouts;
pub mod transport;

pub use client::{LiveFeedClient, LiveFeedClientBuilder};
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use error::{FeedLinkError, Result};
pub use event_handlers::{DisconnectReason, HandlerError, HandlerResult, SubscriptionHandlers};
pub use heartbeat::HeartbeatMonitor;
pub use models::{
    ChangeEvent, ChannelRequest, ConnectionState, ConnectionStatus, EqFilter, EventMask,
    InboundMessage, OperationKind, OutboundMessage, PresenceMap, PresenceMessage, PresenceState,
    RetryPolicy, Row, SubscriptionConfig,
};
pub use retry::{RetryDecision, RetryScheduler};
pub use signals::{AppLifecycle, ConnectivitySignal, ConnectivitySource, LifecycleSignal, LifecycleSource};
pub use timeouts::{FeedLinkTimeouts, FeedLinkTimeoutsBuilder};
pub use transport::{Channel, ChannelSink, ChannelStatus, MemoryTransport, Transport, WebSocketTransport};
