//! Integration tests for the WebSocket transport against an in-process
//! `tokio-tungstenite` server on a loopback listener.

use feed_link::{
    ConnectionStatus, EqFilter, FeedLinkError, FeedLinkTimeouts, LiveFeedClient, RetryPolicy,
    SubscriptionConfig, SubscriptionHandlers,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;

mod common;

use common::recording_handlers;

type ServerSocket = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut ServerSocket) -> Option<JsonValue> {
    while let Some(frame) = ws.next().await {
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn send_json(ws: &mut ServerSocket, value: JsonValue) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn wait_for_status(client: &LiveFeedClient, status: ConnectionStatus) {
    let mut rx = client.watch_state();
    let reached = matches!(
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| s.status == status)).await,
        Ok(Ok(_))
    );
    assert!(reached, "timed out waiting for {}, still {}", status, client.status());
}

fn config() -> SubscriptionConfig {
    SubscriptionConfig::new("messages")
        .with_schema("chat")
        .with_filter(EqFilter::new("room_id", 42))
        .with_retry_policy(RetryPolicy::new(0, 100))
        .with_heartbeat_interval_ms(0)
}

#[tokio::test]
async fn test_subscribe_receive_send_and_close() {
    let (listener, addr) = listen().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<JsonValue>();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        let subscribe = next_json(&mut ws).await.expect("subscribe frame");
        frames_tx.send(subscribe).unwrap();
        send_json(&mut ws, json!({"type": "subscribed"})).await;
        send_json(
            &mut ws,
            json!({"type": "change", "operation": "insert", "record": {"id": 7}}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "presence_state", "state": {"alice": [{"status": "online"}]}}),
        )
        .await;

        let broadcast = next_json(&mut ws).await.expect("broadcast frame");
        frames_tx.send(broadcast).unwrap();

        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let (recorder, handlers) = recording_handlers();
    let client = LiveFeedClient::builder()
        .config(config())
        .websocket_url(format!("ws://{}", addr))
        .timeouts(FeedLinkTimeouts::fast())
        .handlers(handlers)
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;

    let subscribe = frames_rx.recv().await.unwrap();
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["channel"]["resource"], "messages");
    assert_eq!(subscribe["channel"]["schema"], "chat");
    assert_eq!(subscribe["channel"]["filter"]["column"], "room_id");
    assert_eq!(subscribe["channel"]["events"], "*");

    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.events().is_empty() || client.presence().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("insert and presence delivered");
    assert_eq!(recorder.events(), vec!["insert 7"]);
    assert!(client.presence().get("alice").is_some());

    client.send("typing", json!({"user": "bob"})).await.unwrap();
    let broadcast = frames_rx.recv().await.unwrap();
    assert_eq!(
        broadcast,
        json!({"type": "broadcast", "event": "typing", "payload": {"user": "bob"}})
    );

    // a normal close is final
    wait_for_status(&client, ConnectionStatus::Disconnected).await;
    assert!(recorder.errors().is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_reply_is_a_channel_error() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "error", "message": "no such table"})).await;
        while ws.next().await.is_some() {}
    });

    let (recorder, handlers) = recording_handlers();
    let client = LiveFeedClient::builder()
        .config(config())
        .websocket_url(format!("ws://{}", addr))
        .timeouts(FeedLinkTimeouts::fast())
        .handlers(handlers)
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::MaxRetriesExceeded).await;
    assert_eq!(
        recorder.errors().first(),
        Some(&FeedLinkError::ChannelError("no such table".to_string()))
    );
    server.abort();
}

#[tokio::test]
async fn test_missing_ack_times_out() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        // read frames but never acknowledge the subscription
        while ws.next().await.is_some() {}
    });

    let (recorder, handlers) = recording_handlers();
    let timeouts = FeedLinkTimeouts::builder()
        .connection_timeout_secs(2)
        .subscribe_timeout(Duration::from_millis(200))
        .close_timeout(Duration::from_millis(200))
        .build();
    let client = LiveFeedClient::builder()
        .config(config())
        .websocket_url(format!("ws://{}", addr))
        .timeouts(timeouts)
        .handlers(handlers)
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::MaxRetriesExceeded).await;
    assert!(matches!(
        recorder.errors().first(),
        Some(FeedLinkError::TimeoutError(_))
    ));
    server.abort();
}

#[tokio::test]
async fn test_unreachable_server_is_an_error() {
    // bind then drop to get a port nobody listens on
    let (listener, addr) = listen().await;
    drop(listener);

    let (recorder, handlers) = recording_handlers();
    let client = LiveFeedClient::builder()
        .config(config())
        .transport(Arc::new(feed_link::WebSocketTransport::new(
            format!("ws://{}", addr),
            FeedLinkTimeouts::fast(),
        )))
        .handlers(handlers)
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::MaxRetriesExceeded).await;
    assert!(matches!(
        recorder.errors().first(),
        Some(FeedLinkError::ChannelError(msg)) if msg.starts_with("Connection failed")
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_and_disconnect_while_inbound_queue_is_full() {
    const FLOOD: usize = 3_000;

    let (listener, addr) = listen().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<JsonValue>();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _ = next_json(&mut ws).await;
        send_json(&mut ws, json!({"type": "subscribed"})).await;
        for id in 0..FLOOD {
            send_json(
                &mut ws,
                json!({"type": "change", "operation": "insert", "record": {"id": id}}),
            )
            .await;
        }
        while let Some(frame) = next_json(&mut ws).await {
            let _ = frames_tx.send(frame);
        }
    });

    // the first row stalls the handler long enough for the flood to fill
    // the client's inbound queue
    let inserts = Arc::new(AtomicUsize::new(0));
    let seen = inserts.clone();
    let handlers = SubscriptionHandlers::new().on_insert(move |_row| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::task::block_in_place(|| std::thread::sleep(Duration::from_millis(1_500)));
        }
        Ok(())
    });

    let client = LiveFeedClient::builder()
        .config(config())
        .websocket_url(format!("ws://{}", addr))
        .timeouts(FeedLinkTimeouts::fast())
        .handlers(handlers)
        .build()
        .unwrap();

    client.connect().await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let sent = tokio::time::timeout(
        Duration::from_secs(10),
        client.send("typing", json!({"user": "bob"})),
    )
    .await;
    assert!(matches!(sent, Ok(Ok(()))), "send did not complete: {:?}", sent);

    let broadcast = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match frames_rx.recv().await {
                Some(frame) if frame["type"] == "broadcast" => return Some(frame),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .expect("broadcast reached the server");
    assert_eq!(broadcast.map(|f| f["event"].clone()), Some(json!("typing")));

    // every queued row is still delivered once the handler recovers
    tokio::time::timeout(Duration::from_secs(20), async {
        while inserts.load(Ordering::SeqCst) < FLOOD {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all rows delivered");
    assert_eq!(client.status(), ConnectionStatus::Connected);

    tokio::time::timeout(Duration::from_secs(5), client.disconnect())
        .await
        .expect("disconnect completes");
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    server.abort();
}
