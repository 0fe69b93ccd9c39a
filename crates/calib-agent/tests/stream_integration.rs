//! Integration tests for the streaming agent.
//!
//! Each test binds the agent on `127.0.0.1:0`, connects with a real
//! WebSocket client, and checks the message sequence a console observes:
//!
//! ```text
//! Console                                Agent
//! ───────                                ─────
//! GET /ws/<device_id>  ───────────────►
//!                      ◄───────────────  {"type":"connected",...}
//!                      ◄───────────────  {"type":"screenshot",...}   every interval
//! {"type":"stop"}      ───────────────►
//!                      ◄───────────────  Close
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use calib_agent::domain::AgentConfig;
use calib_agent::infrastructure::device::mock::ScriptedScreen;
use calib_agent::infrastructure::serve;
use calib_core::protocol::{decode_frame_payload, decode_server_message, ServerMessage};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn start_agent(source: Arc<ScriptedScreen>, interval_ms: u64) -> (SocketAddr, Arc<AtomicBool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let config = AgentConfig {
        ws_bind_addr: addr,
        frame_interval: Duration::from_millis(interval_ms),
        snapshot_dir: PathBuf::new(),
    };
    tokio::spawn(serve(listener, config, source, Arc::clone(&running)));
    (addr, running)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

/// Next protocol message, or `None` once the agent has closed the stream.
async fn next_message(ws: &mut Client) -> Option<ServerMessage> {
    loop {
        match timeout(WAIT, ws.next()).await.expect("agent went silent") {
            Some(Ok(Message::Text(text))) => return Some(decode_server_message(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_sends_connected_then_screenshots_until_stop() {
    // Arrange
    let screen = Arc::new(ScriptedScreen::new().with_frames("dev1", vec![b"one".to_vec(), b"two".to_vec()]));
    let (addr, _running) = start_agent(Arc::clone(&screen), 20).await;
    let mut ws = connect(addr, "/ws/dev1").await;

    // Act / Assert: greeting
    assert_eq!(next_message(&mut ws).await, Some(ServerMessage::connected("dev1")));

    // Act / Assert: frames arrive in capture order
    for expected in [b"one".as_slice(), b"two".as_slice()] {
        match next_message(&mut ws).await {
            Some(ServerMessage::Screenshot { device_id, screenshot, .. }) => {
                assert_eq!(device_id, "dev1");
                assert_eq!(decode_frame_payload(&screenshot).unwrap(), expected);
            }
            other => panic!("expected screenshot, got {other:?}"),
        }
    }

    // Act: stop
    ws.send(Message::Text(r#"{"type":"stop"}"#.to_string())).await.unwrap();

    // Assert: the agent closes; any frame already in flight may still arrive.
    let mut closed = false;
    for _ in 0..5 {
        match next_message(&mut ws).await {
            None => {
                closed = true;
                break;
            }
            Some(ServerMessage::Screenshot { .. }) => continue,
            Some(other) => panic!("unexpected message after stop: {other:?}"),
        }
    }
    assert!(closed, "agent must close the stream after stop");
}

#[tokio::test]
async fn test_unknown_device_gets_error_and_close() {
    // Arrange
    let (addr, _running) = start_agent(Arc::new(ScriptedScreen::new()), 20).await;
    let mut ws = connect(addr, "/ws/ghost").await;

    // Act / Assert
    assert_eq!(
        next_message(&mut ws).await,
        Some(ServerMessage::error("Failed to connect to device: ghost"))
    );
    assert_eq!(next_message(&mut ws).await, None);
}

#[tokio::test]
async fn test_device_open_failure_gets_error_and_close() {
    let screen = Arc::new(ScriptedScreen::new().with_open_failure("dev1"));
    let (addr, _running) = start_agent(screen, 20).await;
    let mut ws = connect(addr, "/ws/dev1").await;

    assert_eq!(
        next_message(&mut ws).await,
        Some(ServerMessage::error("Failed to connect to device: dev1"))
    );
    assert_eq!(next_message(&mut ws).await, None);
}

#[tokio::test]
async fn test_wrong_path_gets_error() {
    let (addr, _running) = start_agent(Arc::new(ScriptedScreen::new()), 20).await;
    let mut ws = connect(addr, "/stream").await;

    match next_message(&mut ws).await {
        Some(ServerMessage::Error { message }) => assert!(message.contains("/stream")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_capture_failure_sends_error_and_ends_stream() {
    // Arrange: the second capture fails
    let screen = Arc::new(
        ScriptedScreen::new()
            .with_frames("dev1", vec![b"ok".to_vec()])
            .with_capture_failure_at("dev1", 1),
    );
    let (addr, _running) = start_agent(Arc::clone(&screen), 10).await;
    let mut ws = connect(addr, "/ws/dev1").await;

    // Act
    let connected = next_message(&mut ws).await;
    let first = next_message(&mut ws).await;
    let failure = next_message(&mut ws).await;
    let end = next_message(&mut ws).await;

    // Assert
    assert_eq!(connected, Some(ServerMessage::connected("dev1")));
    assert!(matches!(first, Some(ServerMessage::Screenshot { .. })));
    match failure {
        Some(ServerMessage::Error { message }) => assert!(message.starts_with("Screen capture failed")),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(end, None);
    assert_eq!(screen.capture_count("dev1"), 2);
}

#[tokio::test]
async fn test_unknown_console_message_is_ignored() {
    // Arrange
    let screen = Arc::new(ScriptedScreen::new().with_frames("dev1", vec![b"f".to_vec()]));
    let (addr, _running) = start_agent(screen, 20).await;
    let mut ws = connect(addr, "/ws/dev1").await;
    assert_eq!(next_message(&mut ws).await, Some(ServerMessage::connected("dev1")));

    // Act
    ws.send(Message::Text(r#"{"type":"pause"}"#.to_string())).await.unwrap();
    ws.send(Message::Text("not json".to_string())).await.unwrap();

    // Assert: frames keep coming
    for _ in 0..3 {
        assert!(matches!(
            next_message(&mut ws).await,
            Some(ServerMessage::Screenshot { .. })
        ));
    }
}

#[tokio::test]
async fn test_clearing_running_flag_stops_accept_loop() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let config = AgentConfig::default();
    let handle = tokio::spawn(serve(
        listener,
        config,
        Arc::new(ScriptedScreen::new()),
        Arc::clone(&running),
    ));

    // Act
    running.store(false, Ordering::Relaxed);

    // Assert: the loop notices within a couple of poll periods
    let result = timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
