//! WebSocket implementation of [`StreamChannel`].
//!
//! Each `open` dials `<agent_url>/ws/<device_id>` and, once the handshake
//! completes, splits the socket into two Tokio tasks:
//!
//! - **reader** – decodes agent messages into [`ChannelEvent`]s.
//! - **writer** – waits for a [`ControlCommand`] from the handle, sends
//!   `{"type":"stop"}` and closes the socket.
//!
//! Frames go to the subscription's latest-frame slot, where each new frame
//! replaces the one before it.  A slow subscriber skips stale frames and
//! always sees the newest.  Errors and connection loss are queued and always
//! delivered.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use calib_core::protocol::{decode_server_message, encode, ClientMessage, ServerMessage};

use super::{
    ChannelError, ChannelEvent, ChannelState, ControlCommand, FrameSlot, StateCell, StreamChannel,
    StreamFrame, StreamHandle, StreamSubscription,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Capacity of the per-stream queue of non-frame events.
const EVENT_BUFFER: usize = 8;

/// Connects to the streaming agent over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketChannel {
    agent_url: String,
    open_timeout: Duration,
}

impl WebSocketChannel {
    /// `agent_url` is the base URL, e.g. `ws://127.0.0.1:24900`.
    pub fn new(agent_url: impl Into<String>, open_timeout: Duration) -> Self {
        Self {
            agent_url: agent_url.into(),
            open_timeout,
        }
    }

    /// Full stream URL for `device_id`.
    pub fn stream_url(&self, device_id: &str) -> String {
        format!("{}/ws/{}", self.agent_url.trim_end_matches('/'), device_id)
    }
}

#[async_trait]
impl StreamChannel for WebSocketChannel {
    async fn open(&self, device_id: &str) -> Result<StreamSubscription, ChannelError> {
        let url = self.stream_url(device_id);
        let state = StateCell::new();
        state.transition(ChannelState::Connecting);
        debug!("stream {device_id}: connecting to {url}");

        let connect_error = |reason: String| {
            state.transition(ChannelState::Failed);
            warn!("stream {device_id}: connection failed: {reason}");
            ChannelError::ConnectionError {
                device_id: device_id.to_string(),
                reason,
            }
        };

        let ws = match timeout(self.open_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(connect_error(e.to_string())),
            Err(_) => {
                return Err(connect_error(format!(
                    "no handshake within {:?}",
                    self.open_timeout
                )))
            }
        };

        state.transition(ChannelState::Open);
        info!("stream {device_id}: open");

        let (ws_tx, ws_rx) = ws.split();
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (frame_tx, frames) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(4);

        tokio::spawn(read_loop(device_id.to_string(), ws_rx, event_tx, frame_tx, state.clone()));
        tokio::spawn(write_loop(device_id.to_string(), ws_tx, control_rx));

        Ok(StreamSubscription::new(
            StreamHandle::new(device_id, state, control_tx),
            events,
            frames,
        ))
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

async fn read_loop(
    device_id: String,
    mut ws_rx: WsSource,
    events: mpsc::Sender<ChannelEvent>,
    frames: FrameSlot,
    state: StateCell,
) {
    let mut frame_count: u64 = 0;
    let lost_reason = loop {
        match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => match decode_server_message(&text) {
                Ok(ServerMessage::Connected { device_id: id, message }) => {
                    if events
                        .send(ChannelEvent::Connected { device_id: id, message })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(ServerMessage::Screenshot {
                    device_id: id,
                    screenshot,
                    timestamp,
                }) => match StreamFrame::decode(id, &screenshot, timestamp) {
                    Ok(frame) => {
                        frame_count += 1;
                        // No receiver left means the subscription was dropped.
                        if frames.is_closed() {
                            return;
                        }
                        frames.send_replace(Some(frame));
                    }
                    Err(e) => warn!("stream {device_id}: {e}"),
                },
                Ok(ServerMessage::Error { message }) => {
                    warn!("stream {device_id}: agent error: {message}");
                    if events.send(ChannelEvent::RemoteError { message }).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!("stream {device_id}: ignoring agent message: {e}"),
            },
            Some(Ok(WsMessage::Close(_))) | None => break "closed by agent".to_string(),
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed)) => break "connection closed".to_string(),
            Some(Err(e)) => break e.to_string(),
        }
    };

    debug!("stream {device_id}: reader finished after {frame_count} frame(s)");

    // A locally closed stream ends quietly; anything else is a loss.
    if state.transition(ChannelState::Failed) {
        warn!("stream {device_id}: connection lost: {lost_reason}");
        let _ = events
            .send(ChannelEvent::ConnectionLost { reason: lost_reason })
            .await;
    }
}

async fn write_loop(device_id: String, mut ws_tx: WsSink, mut control: mpsc::Receiver<ControlCommand>) {
    // `None` means every handle was dropped; close the socket as well.
    if let Some(ControlCommand::Stop) = control.recv().await {
        match encode(&ClientMessage::Stop) {
            Ok(text) => {
                if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                    debug!("stream {device_id}: stop not delivered: {e}");
                }
            }
            Err(e) => warn!("stream {device_id}: {e}"),
        }
    }
    let _ = ws_tx.close().await;
    debug!("stream {device_id}: writer finished");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
