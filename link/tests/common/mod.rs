//! Shared helpers for the feed-link integration tests.
//!
//! Most suites drive a [`LiveFeedClient`] through a [`MemoryTransport`]
//! under paused Tokio time, so timer-driven behaviour (retries, heartbeats)
//! runs instantly and deterministically.

#![allow(dead_code)]

use feed_link::{
    ConnectionStatus, FeedLinkError, LiveFeedClient, MemoryTransport, RetryPolicy, Row,
    SubscriptionConfig, SubscriptionHandlers,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the recording handlers observed.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<FeedLinkError>>,
    pub connects: AtomicUsize,
    pub disconnects: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<FeedLinkError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().unwrap().clone()
    }
}

/// Handlers that log every callback into a shared [`Recorder`].
pub fn recording_handlers() -> (Arc<Recorder>, SubscriptionHandlers) {
    let recorder = Arc::new(Recorder::default());
    let (r1, r2, r3, r4, r5, r6, r7) = (
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
    );
    let handlers = SubscriptionHandlers::new()
        .on_insert(move |row| {
            r1.events.lock().unwrap().push(format!("insert {}", row["id"]));
            Ok(())
        })
        .on_update(move |new, old| {
            r2.events
                .lock()
                .unwrap()
                .push(format!("update {} <- {}", new["id"], old["id"]));
            Ok(())
        })
        .on_delete(move |old| {
            r3.events.lock().unwrap().push(format!("delete {}", old["id"]));
            Ok(())
        })
        .on_broadcast(move |event, payload| {
            r4.events
                .lock()
                .unwrap()
                .push(format!("broadcast {} {}", event, payload));
            Ok(())
        })
        .on_error(move |err| r5.errors.lock().unwrap().push(err))
        .on_connect(move || {
            r6.connects.fetch_add(1, Ordering::SeqCst);
        })
        .on_disconnect(move |reason| r7.disconnects.lock().unwrap().push(reason.message));
    (recorder, handlers)
}

/// Config with heartbeats off and a small retry budget.
pub fn test_config() -> SubscriptionConfig {
    SubscriptionConfig::new("messages")
        .with_schema("chat")
        .with_retry_policy(RetryPolicy::new(3, 1000))
        .with_heartbeat_interval_ms(0)
}

pub fn build_client(
    transport: &MemoryTransport,
    config: SubscriptionConfig,
    handlers: SubscriptionHandlers,
) -> LiveFeedClient {
    LiveFeedClient::builder()
        .config(config)
        .transport(Arc::new(transport.clone()))
        .handlers(handlers)
        .build()
        .expect("client should build")
}

/// Wait (in paused time) until the client reports `status`.
pub async fn wait_for_status(client: &LiveFeedClient, status: ConnectionStatus) {
    let mut rx = client.watch_state();
    let reached = matches!(
        tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| s.status == status)).await,
        Ok(Ok(_))
    );
    assert!(
        reached,
        "timed out waiting for {}, still {}",
        status,
        client.status()
    );
}

/// Let every spawned task run until the runtime is idle.
///
/// Under paused time the clock only auto-advances once nothing else is
/// runnable, so this returns after all queued work has been processed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub fn row(id: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(id));
    row
}
