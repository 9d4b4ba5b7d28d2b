//! JSON-over-WebSocket change-feed transport.
//!
//! Every [`Channel`] gets its own WebSocket connection and background task.
//! The task connects, sends a `subscribe` frame for the channel request and
//! waits for the server's `subscribed` acknowledgment. After that it relays
//! outbound messages and decodes inbound frames until the connection ends.
//!
//! Frames are JSON objects tagged by `type`; see [`ClientMessage`] and
//! [`ServerMessage`] for the shapes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::error::{FeedLinkError, Result};
use crate::models::{ChannelRequest, ClientMessage, OutboundMessage, ServerMessage};
use crate::timeouts::{bounded, FeedLinkTimeouts};

use super::{Channel, ChannelEvent, ChannelSink, ChannelStatus, Transport};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport that opens one WebSocket connection per channel.
///
/// ```rust,no_run
/// use feed_link::transport::WebSocketTransport;
/// use feed_link::FeedLinkTimeouts;
///
/// let transport = WebSocketTransport::new("ws://localhost:4000/feed", FeedLinkTimeouts::default());
/// assert_eq!(transport.url(), "ws://localhost:4000/feed");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    timeouts: FeedLinkTimeouts,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, timeouts: FeedLinkTimeouts) -> Self {
        Self {
            url: url.into(),
            timeouts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeouts(&self) -> &FeedLinkTimeouts {
        &self.timeouts
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, request: ChannelRequest, sink: ChannelSink) -> Box<dyn Channel> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCmd>(32);
        let task = tokio::spawn(channel_task(
            self.url.clone(),
            self.timeouts.clone(),
            request,
            sink,
            cmd_rx,
        ));
        Box::new(WebSocketChannel {
            cmd_tx,
            task: Some(task),
            send_timeout: self.timeouts.send_timeout,
            close_timeout: self.timeouts.close_timeout,
        })
    }
}

// ── Channel handle ──────────────────────────────────────────────────────────

enum WsCmd {
    Send {
        message: OutboundMessage,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Close,
}

struct WebSocketChannel {
    cmd_tx: mpsc::Sender<WsCmd>,
    task: Option<JoinHandle<()>>,
    send_timeout: Duration,
    close_timeout: Duration,
}

#[async_trait]
impl Channel for WebSocketChannel {
    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        let round_trip = async {
            let (result_tx, result_rx) = oneshot::channel();
            self.cmd_tx
                .send(WsCmd::Send { message, result_tx })
                .await
                .map_err(|_| FeedLinkError::ChannelError("channel is closed".to_string()))?;
            result_rx
                .await
                .map_err(|_| FeedLinkError::ChannelError("channel task ended".to_string()))?
        };
        match bounded(self.send_timeout, round_trip).await {
            Some(result) => result,
            None => Err(FeedLinkError::TimeoutError(format!(
                "Send timeout ({:?})",
                self.send_timeout
            ))),
        }
    }

    async fn close(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        let _ = self.cmd_tx.try_send(WsCmd::Close);
        if bounded(self.close_timeout, &mut task).await.is_none() {
            log::debug!("[feed-link] Channel task did not close in {:?}; aborting", self.close_timeout);
            task.abort();
        }
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Background channel task ─────────────────────────────────────────────────
//
// The task never awaits the client's queue on its own. Every wait for queue
// room is one branch of a `select!` that also serves commands, so a client
// busy sending on this channel cannot stall against a full queue. While an
// event is waiting for room, no further frames are read from the socket.

async fn channel_task(
    url: String,
    timeouts: FeedLinkTimeouts,
    request: ChannelRequest,
    sink: ChannelSink,
    mut cmd_rx: mpsc::Receiver<WsCmd>,
) {
    let topic = request.topic();

    // A close requested while still connecting wins; nothing is reported.
    let setup = tokio::select! {
        result = establish_and_join(&url, &timeouts, request) => result,
        _ = wait_for_close(&mut cmd_rx) => {
            log::debug!("[feed-link] Channel {} closed before it joined", topic);
            return;
        }
    };

    let mut ws = match setup {
        Ok(ws) => ws,
        Err(status) => {
            log::debug!("[feed-link] Channel {} failed to join: {:?}", topic, status);
            report_final(&sink, &mut cmd_rx, status).await;
            return;
        },
    };

    log::info!("[feed-link] Channel {} subscribed", topic);

    // Event waiting for room in the client's queue.
    let mut outbox = Some(ChannelEvent::Status(ChannelStatus::Subscribed));
    // Set once the outbox holds the last status this channel reports.
    let mut ended = false;

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(WsCmd::Send { message, result_tx }) => {
                    let result = if ended {
                        Err(channel_ended())
                    } else {
                        send_frame(&mut ws, &ClientMessage::from(message), &timeouts).await
                    };
                    let _ = result_tx.send(result);
                },
                Some(WsCmd::Close) | None => {
                    if !ended {
                        let _ = send_frame(&mut ws, &ClientMessage::Unsubscribe, &timeouts).await;
                        let _ = ws.close(None).await;
                    }
                    log::debug!("[feed-link] Channel {} closed", topic);
                    return;
                },
            },

            permit = sink.reserve(), if outbox.is_some() => {
                let Some(permit) = permit else {
                    log::debug!("[feed-link] Client for channel {} is gone", topic);
                    let _ = ws.close(None).await;
                    return;
                };
                if let Some(event) = outbox.take() {
                    permit.send(event);
                }
                if ended {
                    return;
                }
            },

            frame = ws.next(), if outbox.is_none() && !ended => {
                let decoded = match frame {
                    Some(Ok(Message::Text(text))) => decode_server_frame(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => decode_server_frame(&data),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = bounded(timeouts.send_timeout, ws.send(Message::Pong(payload))).await;
                        None
                    },
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => None,
                    Some(Ok(Message::Close(frame))) => Some(ChannelEvent::Status(match frame {
                        Some(f) if f.code != CloseCode::Normal => ChannelStatus::Error(format!(
                            "Server closed connection ({}): {}",
                            u16::from(f.code),
                            f.reason.as_str()
                        )),
                        _ => ChannelStatus::Closed,
                    })),
                    Some(Err(e)) => Some(ChannelEvent::Status(ChannelStatus::Error(format!(
                        "WebSocket error: {}",
                        e
                    )))),
                    None => Some(ChannelEvent::Status(ChannelStatus::Error(
                        "WebSocket stream ended".to_string(),
                    ))),
                };
                if let Some(event) = decoded {
                    if let ChannelEvent::Status(status) = &event {
                        log::info!("[feed-link] Channel {} ended: {:?}", topic, status);
                        ended = true;
                    }
                    outbox = Some(event);
                }
            }
        }
    }
}

/// Report the outcome of a channel that never joined, answering commands
/// until the client has room for it.
async fn report_final(sink: &ChannelSink, cmd_rx: &mut mpsc::Receiver<WsCmd>, status: ChannelStatus) {
    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(WsCmd::Send { result_tx, .. }) => {
                    let _ = result_tx.send(Err(channel_ended()));
                },
                Some(WsCmd::Close) | None => return,
            },

            permit = sink.reserve() => {
                if let Some(permit) = permit {
                    permit.send(ChannelEvent::Status(status));
                }
                return;
            }
        }
    }
}

fn channel_ended() -> FeedLinkError {
    FeedLinkError::ChannelError("channel has ended".to_string())
}

/// Decode one data frame into the event it carries for the client. A server
/// `error` frame becomes a terminal status.
fn decode_server_frame(data: &[u8]) -> Option<ChannelEvent> {
    match serde_json::from_slice::<ServerMessage>(data) {
        Ok(ServerMessage::Error { message }) => {
            Some(ChannelEvent::Status(ChannelStatus::Error(message)))
        },
        Ok(ServerMessage::Subscribed) => {
            log::debug!("[feed-link] Ignoring repeated subscribed frame");
            None
        },
        Ok(message) => match message.into_inbound() {
            Some(inbound) => Some(ChannelEvent::Message(inbound)),
            None => {
                log::warn!("[feed-link] Dropping change frame without its row");
                None
            },
        },
        Err(e) => {
            log::warn!("[feed-link] Failed to parse server frame: {}", e);
            None
        },
    }
}

/// Drain commands until a close is requested or the handle is dropped.
async fn wait_for_close(cmd_rx: &mut mpsc::Receiver<WsCmd>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            WsCmd::Send { result_tx, .. } => {
                let _ = result_tx.send(Err(FeedLinkError::ChannelError(
                    "channel has not joined yet".to_string(),
                )));
            },
            WsCmd::Close => return,
        }
    }
}

async fn establish_and_join(
    url: &str,
    timeouts: &FeedLinkTimeouts,
    request: ChannelRequest,
) -> std::result::Result<WebSocketStream, ChannelStatus> {
    let mut ws = establish_ws(url, timeouts).await?;
    match join_channel(&mut ws, timeouts, request).await {
        Ok(()) => Ok(ws),
        Err(status) => {
            let _ = ws.close(None).await;
            Err(status)
        },
    }
}

async fn establish_ws(
    url: &str,
    timeouts: &FeedLinkTimeouts,
) -> std::result::Result<WebSocketStream, ChannelStatus> {
    log::debug!("[feed-link] Establishing WebSocket connection to {}", url);

    let connect_result =
        bounded(timeouts.connection_timeout, tokio_tungstenite::connect_async(url)).await;

    match connect_result {
        Some(Ok((stream, _))) => Ok(stream),
        Some(Err(tokio_tungstenite::tungstenite::error::Error::Http(response))) => {
            let status = response.status();
            let body_text = response
                .into_body()
                .as_ref()
                .and_then(|b| {
                    if b.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(b).into_owned())
                    }
                })
                .unwrap_or_default();
            let message = match status.as_u16() {
                401 => "Unauthorized: WebSocket requires valid credentials".to_string(),
                403 => "Forbidden: Access to WebSocket denied".to_string(),
                code => {
                    if body_text.is_empty() {
                        format!("WebSocket HTTP error: {}", code)
                    } else {
                        format!("WebSocket HTTP error {}: {}", code, body_text)
                    }
                },
            };
            Err(ChannelStatus::Error(message))
        },
        Some(Err(e)) => Err(ChannelStatus::Error(format!("Connection failed: {}", e))),
        None => {
            log::warn!(
                "[feed-link] Connection timeout ({:?}) for {}",
                timeouts.connection_timeout,
                url
            );
            Err(ChannelStatus::Timeout)
        },
    }
}

async fn join_channel(
    ws: &mut WebSocketStream,
    timeouts: &FeedLinkTimeouts,
    request: ChannelRequest,
) -> std::result::Result<(), ChannelStatus> {
    send_frame(ws, &ClientMessage::Subscribe { channel: request }, timeouts)
        .await
        .map_err(|e| ChannelStatus::Error(e.to_string()))?;

    let ack = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(outcome) = join_reply(text.as_str().as_bytes()) {
                        return outcome;
                    }
                },
                Some(Ok(Message::Binary(data))) => {
                    if let Some(outcome) = join_reply(&data) {
                        return outcome;
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                },
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ChannelStatus::Error(
                        "Connection closed before subscription was acknowledged".to_string(),
                    ));
                },
                Some(Err(e)) => return Err(ChannelStatus::Error(format!("WebSocket error: {}", e))),
                Some(Ok(_)) => {},
            }
        }
    };

    bounded(timeouts.subscribe_timeout, ack)
        .await
        .unwrap_or(Err(ChannelStatus::Timeout))
}

/// Interpret a frame received while waiting for the join acknowledgment.
fn join_reply(data: &[u8]) -> Option<std::result::Result<(), ChannelStatus>> {
    match serde_json::from_slice::<ServerMessage>(data) {
        Ok(ServerMessage::Subscribed) => Some(Ok(())),
        Ok(ServerMessage::Error { message }) => Some(Err(ChannelStatus::Error(message))),
        Ok(other) => {
            log::debug!("[feed-link] Ignoring {:?} frame before subscription ack", other);
            None
        },
        Err(e) => {
            log::warn!("[feed-link] Failed to parse server frame: {}", e);
            None
        },
    }
}

async fn send_frame(
    ws: &mut WebSocketStream,
    message: &ClientMessage,
    timeouts: &FeedLinkTimeouts,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    match bounded(timeouts.send_timeout, ws.send(Message::Text(payload.into()))).await {
        Some(result) => result
            .map_err(|e| FeedLinkError::WebSocketError(format!("Failed to send frame: {}", e))),
        None => Err(FeedLinkError::TimeoutError(format!(
            "Send timeout ({:?})",
            timeouts.send_timeout
        ))),
    }
}
