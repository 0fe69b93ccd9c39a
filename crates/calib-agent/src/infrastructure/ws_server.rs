//! WebSocket server: accept loop and per-device frame pump.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from operator consoles.
//! 3. Upgrading each connection to a WebSocket session and reading the
//!    device id from the request path (`/ws/<device_id>`).
//! 4. Opening the device on the [`ScreenSource`]; on failure an `error`
//!    message is sent and the socket closed.
//! 5. Sending `connected`, then one `screenshot` every `frame_interval` until
//!    the console sends `stop`, closes the socket, or a capture fails.
//! 6. Gracefully shutting down the accept loop when the `running` flag is cleared.
//!
//! Each stream runs in its own Tokio task, so one slow device never delays
//! another.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use calib_core::protocol::{encode, ServerMessage};

use crate::application::{
    capture_failed_message, classify_client_text, connect_failed_message, device_id_from_path,
    ClientAction,
};
use crate::domain::AgentConfig;
use crate::infrastructure::device::ScreenSource;

/// How long `accept()` waits before re-checking the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.ws_bind_addr` and runs [`serve`] until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: AgentConfig,
    source: Arc<dyn ScreenSource>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("streaming agent listening on {}", config.ws_bind_addr);

    serve(listener, config, source, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split from [`run_server`] so tests can bind port 0 and learn the address
/// before the loop starts.
pub async fn serve(
    listener: TcpListener,
    config: AgentConfig,
    source: Arc<dyn ScreenSource>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the shutdown flag even when idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new console connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let source = Arc::clone(&source);
                tokio::spawn(async move {
                    handle_stream_session(stream, peer_addr, cfg, source).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Wraps [`run_session`] and logs the outcome.
async fn handle_stream_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<AgentConfig>,
    source: Arc<dyn ScreenSource>,
) {
    match run_session(raw_stream, peer_addr, config, source).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one device stream.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or a control message
/// cannot be written.  A device that fails to open is not an error here: the
/// console is told through an `error` message.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<AgentConfig>,
    source: Arc<dyn ScreenSource>,
) -> anyhow::Result<()> {
    // ── Step 1: Handshake, remembering the request path ───────────────────────
    let mut request_path = String::new();
    let ws_stream = accept_hdr_async(raw_stream, |req: &Request, resp: Response| {
        request_path = req.uri().path().to_string();
        Ok::<_, ErrorResponse>(resp)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Step 2: Route to a device ─────────────────────────────────────────────
    let device_id = match device_id_from_path(&request_path) {
        Ok(id) => id,
        Err(e) => {
            warn!("session {peer_addr}: {e}");
            send_message(&mut ws_tx, &ServerMessage::error(e.to_string())).await?;
            let _ = ws_tx.close().await;
            return Ok(());
        }
    };
    let session_id = format!("{peer_addr}/{device_id}");

    // ── Step 3: Open the device ───────────────────────────────────────────────
    if let Err(e) = source.open(&device_id).await {
        warn!("session {session_id}: failed to open device: {e}");
        send_message(&mut ws_tx, &connect_failed_message(&device_id)).await?;
        let _ = ws_tx.close().await;
        return Ok(());
    }

    send_message(&mut ws_tx, &ServerMessage::connected(&device_id)).await?;
    info!("session {session_id}: streaming started");

    // ── Step 4: Frame pump ────────────────────────────────────────────────────
    //
    // The first tick fires immediately, so the console gets a frame right
    // after `connected`.
    let mut ticker = interval(config.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut frames_sent: u64 = 0;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => match classify_client_text(&text) {
                        ClientAction::Stop => {
                            info!("session {session_id}: stop requested");
                            break;
                        }
                        ClientAction::Ignore(e) => {
                            warn!("session {session_id}: ignoring console message: {e}");
                        }
                    },
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("session {session_id}: WebSocket Close frame received");
                        break;
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        warn!("session {session_id}: unexpected binary WebSocket frame (ignored)");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                        debug!("session {session_id}: console WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("session {session_id}: console WebSocket error: {e}");
                        break;
                    }
                    None => {
                        debug!("session {session_id}: console stream ended");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                match source.capture(&device_id).await {
                    Ok(image) => {
                        let msg = ServerMessage::screenshot(&device_id, &image, Utc::now());
                        if let Err(e) = send_message(&mut ws_tx, &msg).await {
                            debug!("session {session_id}: frame send failed (console gone): {e:#}");
                            break;
                        }
                        frames_sent += 1;
                    }
                    Err(e) => {
                        warn!("session {session_id}: capture failed: {e}");
                        let _ = send_message(&mut ws_tx, &capture_failed_message(&e)).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("session {session_id}: {frames_sent} frame(s) sent");
    let _ = ws_tx.close().await;
    Ok(())
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Encodes `msg` and writes it as one text frame.
async fn send_message<S>(sink: &mut S, msg: &ServerMessage) -> anyhow::Result<()>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let text = encode(msg)?;
    sink.send(WsMessage::Text(text))
        .await
        .with_context(|| format!("failed to send {} message", msg.type_name()))
}
