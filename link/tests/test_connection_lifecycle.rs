//! Integration tests for the connect / disconnect / reconnect contract:
//!
//! - `connect()` is idempotent and never yields two live channels.
//! - `disconnect()` from every reachable state leaves no pending timer.
//! - Invalid or disabled configuration is reported, never opened.
//! - `send()` / `track_presence()` fail fast while not connected.
//! - Heartbeats run only while connected.

use feed_link::{
    AppLifecycle, ChannelStatus, ConnectionStatus, ConnectivitySignal, FeedLinkError,
    LifecycleSignal, LiveFeedClient, MemoryTransport, OutboundMessage, RetryPolicy,
    SubscriptionConfig, SubscriptionHandlers,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

mod common;

use common::{build_client, recording_handlers, settle, test_config, wait_for_status};

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_connected() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let (recorder, handlers) = recording_handlers();
    let client = build_client(&transport, test_config(), handlers);

    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;

    assert_eq!(client.retry_count(), 0);
    assert!(client.last_error().is_none());
    assert_eq!(recorder.connects(), 1);

    let opens = transport.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].request.resource, "messages");
    assert_eq!(opens[0].request.schema.as_deref(), Some("chat"));
}

#[tokio::test(start_paused = true)]
async fn test_double_connect_opens_one_channel() {
    let transport = MemoryTransport::new();
    let client = build_client(&transport, test_config(), SubscriptionHandlers::new());

    client.connect().await;
    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Connecting);
    assert_eq!(transport.open_count(), 1);

    assert!(transport.report(ChannelStatus::Subscribed).await);
    wait_for_status(&client, ConnectionStatus::Connected).await;

    client.connect().await;
    settle().await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.live_channel_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_from_every_state() {
    // disconnected
    let transport = MemoryTransport::new();
    let client = build_client(&transport, test_config(), SubscriptionHandlers::new());
    client.disconnect().await;
    client.disconnect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    // connecting
    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Connecting);
    client.disconnect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(transport.live_channel_count(), 0);
    // a late status from the closed channel goes nowhere
    assert!(!transport.report(ChannelStatus::Subscribed).await);

    // connected
    transport.set_auto_reply(Some(ChannelStatus::Subscribed));
    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    client.disconnect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(transport.live_channel_count(), 0);

    // retrying
    transport.set_auto_reply(Some(ChannelStatus::Error("boom".to_string())));
    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Retrying).await;
    assert_eq!(client.state().next_retry_delay_ms, Some(1000));
    client.disconnect().await;

    let state = client.state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.next_retry_delay_ms, None);

    let opens_before = transport.open_count();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), opens_before, "retry fired after disconnect");
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_from_max_retries_and_offline() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Timeout);
    let config = test_config().with_retry_policy(RetryPolicy::new(0, 1000));
    let client = build_client(&transport, config, SubscriptionHandlers::new());

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::MaxRetriesExceeded).await;
    client.disconnect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);

    let network = ConnectivitySignal::new(false);
    let offline_client = LiveFeedClient::builder()
        .config(test_config())
        .transport(Arc::new(transport.clone()))
        .connectivity(Arc::new(network.clone()))
        .build()
        .unwrap();
    offline_client.connect().await;
    assert_eq!(offline_client.status(), ConnectionStatus::NetworkDisconnected);
    offline_client.disconnect().await;
    assert_eq!(offline_client.status(), ConnectionStatus::Disconnected);

    // an explicit disconnect is not undone by the network coming back
    network.set_online(true);
    settle().await;
    assert_eq!(offline_client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_config_reports_error() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let (recorder, handlers) = recording_handlers();
    let client = build_client(&transport, test_config().with_enabled(false), handlers);

    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(transport.open_count(), 0);
    assert!(matches!(
        client.last_error(),
        Some(FeedLinkError::ConfigurationError(_))
    ));
    assert!(matches!(
        recorder.errors().as_slice(),
        [FeedLinkError::ConfigurationError(_)]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_empty_resource_reports_error() {
    let transport = MemoryTransport::new();
    let (recorder, handlers) = recording_handlers();
    let client = build_client(&transport, SubscriptionConfig::new("  "), handlers);

    client.connect().await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(transport.open_count(), 0);
    assert_eq!(recorder.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_requires_connection() {
    let transport = MemoryTransport::new();
    let client = build_client(&transport, test_config(), SubscriptionHandlers::new());

    let err = client.send("typing", json!({"user": "a"})).await.unwrap_err();
    assert_eq!(
        err,
        FeedLinkError::NotConnected {
            status: "disconnected".to_string()
        }
    );
    let err = client.track_presence(json!({"user": "a"})).await.unwrap_err();
    assert!(matches!(err, FeedLinkError::NotConnected { .. }));

    client.connect().await;
    let err = client.send("typing", json!({})).await.unwrap_err();
    assert_eq!(
        err,
        FeedLinkError::NotConnected {
            status: "connecting".to_string()
        }
    );

    assert!(transport.sent().is_empty());
    assert!(client.untrack_presence().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_send_while_connected() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let client = build_client(&transport, test_config(), SubscriptionHandlers::new());
    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;

    client.send("typing", json!({"user": "a"})).await.unwrap();
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].message,
        OutboundMessage::Broadcast {
            event: "typing".to_string(),
            payload: json!({"user": "a"}),
        }
    );

    transport.set_fail_sends(Some("socket gone".to_string()));
    let err = client.send("typing", json!({})).await.unwrap_err();
    assert_eq!(err, FeedLinkError::ChannelError("socket gone".to_string()));
    // a failed send does not change the connection status
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_is_not_retried() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let (recorder, handlers) = recording_handlers();
    let client = build_client(&transport, test_config(), handlers);
    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;

    assert!(transport.report(ChannelStatus::Closed).await);
    wait_for_status(&client, ConnectionStatus::Disconnected).await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(recorder.disconnects(), vec!["Channel closed".to_string()]);
    assert!(recorder.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_only_while_connected() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let config = test_config().with_heartbeat_interval_ms(30_000);
    let client = build_client(&transport, config, SubscriptionHandlers::new());

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    assert!(client.last_heartbeat_at_ms().is_none());

    sleep(Duration::from_millis(29_000)).await;
    assert_eq!(transport.heartbeat_count(), 0);

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(transport.heartbeat_count(), 1);
    assert!(client.last_heartbeat_at_ms().is_some());

    client.disconnect().await;
    sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.heartbeat_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_failure_keeps_connection() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let config = test_config().with_heartbeat_interval_ms(1_000);
    let (recorder, handlers) = recording_handlers();
    let client = build_client(&transport, config, handlers);

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    transport.set_fail_sends(Some("socket gone".to_string()));

    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(transport.open_count(), 1);
    assert!(client.last_heartbeat_at_ms().is_none());
    assert!(recorder.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_heartbeat_keeps_last_beat_time() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let config = test_config().with_heartbeat_interval_ms(1_000);
    let client = build_client(&transport, config, SubscriptionHandlers::new());

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    sleep(Duration::from_millis(1_500)).await;
    let first = client.last_heartbeat_at_ms();
    assert!(first.is_some());

    transport.set_fail_sends(Some("socket gone".to_string()));
    sleep(Duration::from_millis(3_000)).await;
    assert_eq!(transport.heartbeat_count(), 1);
    assert_eq!(client.last_heartbeat_at_ms(), first);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_and_drop_stop_the_task() {
    let transport = MemoryTransport::new().with_auto_reply(ChannelStatus::Subscribed);
    let lifecycle = LifecycleSignal::new(AppLifecycle::Foreground);
    let client = LiveFeedClient::builder()
        .config(test_config())
        .transport(Arc::new(transport.clone()))
        .lifecycle(Arc::new(lifecycle.clone()))
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    client.shutdown().await;
    assert_eq!(transport.live_channel_count(), 0);

    // commands after shutdown are inert
    client.connect().await;
    assert!(matches!(
        client.send("x", json!(null)).await,
        Err(FeedLinkError::InternalError(_))
    ));
    assert_eq!(transport.open_count(), 1);

    let dropped = build_client(&transport, test_config(), SubscriptionHandlers::new());
    dropped.connect().await;
    wait_for_status(&dropped, ConnectionStatus::Connected).await;
    assert_eq!(transport.live_channel_count(), 1);
    drop(dropped);
    settle().await;
    assert_eq!(transport.live_channel_count(), 0);
}

#[tokio::test]
async fn test_builder_requires_config_and_transport() {
    let err = LiveFeedClient::builder()
        .transport(Arc::new(MemoryTransport::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, FeedLinkError::ConfigurationError(_)));

    let err = LiveFeedClient::builder().config(test_config()).build().err().unwrap();
    assert!(matches!(err, FeedLinkError::ConfigurationError(_)));
}
