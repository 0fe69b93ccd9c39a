//! Streaming channel: the console's side of one device screen stream.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──open──► Connecting ──handshake──► Open ──close()──► Closed
//!                    │                       │
//!                    └──timeout/refused──►  Failed ◄──transport error / remote close
//! ```
//!
//! [`StreamChannel::open`] resolves once the handshake completed (or failed),
//! and hands back a [`StreamSubscription`]: a [`StreamHandle`] to close the
//! stream and the feed of [`ChannelEvent`]s.  A channel never retries on its
//! own; reconnecting is the orchestrator's call.
//!
//! The feed has two lanes.  Greetings, agent errors and connection loss are
//! queued and always delivered.  Frames go through a single latest-frame
//! slot: each new frame replaces the one before it, so a subscriber that
//! falls behind skips straight to the newest screen.
//!
//! `RemoteError` and `ConnectionLost` are kept apart: the first is the agent
//! saying something went wrong on the device, the second is the transport
//! going away.

pub mod mock;
pub mod websocket;

pub use websocket::WebSocketChannel;

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use calib_core::protocol::decode_frame_payload;

/// Errors surfaced by a streaming channel.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChannelError {
    /// The handshake did not complete (refused, bad URL, or timed out).
    #[error("could not connect to stream for {device_id}: {reason}")]
    ConnectionError { device_id: String, reason: String },

    /// A send on a broken socket.
    #[error("stream network error: {0}")]
    Network(String),

    /// A `screenshot` payload that is not a decodable PNG/JPEG image.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

// ── Channel state ─────────────────────────────────────────────────────────────

/// Connection state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ChannelState {
    /// Whether the state machine allows `self → next`.
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Open, Closed)
                | (Open, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Failed)
    }
}

/// Shared, transition-checked [`ChannelState`].
///
/// Held by the handle and by the channel's background tasks.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<Mutex<ChannelState>>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ChannelState::Idle)))
    }

    pub fn get(&self) -> ChannelState {
        match self.0.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Applies `next` if the transition is allowed; returns whether it was.
    pub fn transition(&self, next: ChannelState) -> bool {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.can_transition_to(next) {
            *guard = next;
            true
        } else {
            false
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

// ── Frames and events ─────────────────────────────────────────────────────────

/// One decoded screen frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub device_id: String,
    /// Encoded image bytes as sent by the agent.
    pub image: Vec<u8>,
    /// File extension of the encoding (`"png"`, `"jpg"`).
    pub format: &'static str,
    /// Native pixel width of the frame.
    pub width: u32,
    /// Native pixel height of the frame.
    pub height: u32,
    /// Capture time reported by the agent.
    pub timestamp: DateTime<Utc>,
}

impl StreamFrame {
    /// Decodes a `screenshot` payload and reads the image dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidFrame`] if the payload is not base64 or
    /// not a recognisable PNG/JPEG.
    pub fn decode(
        device_id: impl Into<String>,
        payload: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ChannelError> {
        let image = decode_frame_payload(payload).map_err(|e| ChannelError::InvalidFrame(e.to_string()))?;
        Self::from_image(device_id, image, timestamp)
    }

    /// Wraps raw image bytes, reading their format and dimensions.
    pub fn from_image(
        device_id: impl Into<String>,
        image: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ChannelError> {
        let reader = image::ImageReader::new(Cursor::new(image.as_slice()))
            .with_guessed_format()
            .map_err(|e| ChannelError::InvalidFrame(e.to_string()))?;
        let format = reader
            .format()
            .and_then(|f| f.extensions_str().first().copied())
            .ok_or_else(|| ChannelError::InvalidFrame("unrecognised image format".to_string()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ChannelError::InvalidFrame(e.to_string()))?;

        Ok(Self {
            device_id: device_id.into(),
            image,
            format,
            width,
            height,
            timestamp,
        })
    }
}

/// Everything a subscriber can observe on an open stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The agent's `connected` greeting.
    Connected { device_id: String, message: String },
    Frame(StreamFrame),
    /// The agent reported a failure (for example a capture error).
    RemoteError { message: String },
    /// The transport went away while the stream was open.
    ConnectionLost { reason: String },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Commands from a [`StreamHandle`] to the channel's writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Send `stop`, then close the socket.
    Stop,
}

/// Control side of an open stream.  Cloning shares the same stream.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    device_id: String,
    state: StateCell,
    control: mpsc::Sender<ControlCommand>,
}

impl StreamHandle {
    /// Builds a handle over `state`, delivering commands to `control`.
    ///
    /// Used by [`StreamChannel`] implementations.
    pub fn new(device_id: impl Into<String>, state: StateCell, control: mpsc::Sender<ControlCommand>) -> Self {
        Self {
            device_id: device_id.into(),
            state,
            control,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Asks the agent to stop and moves the stream to `Closed`.
    ///
    /// Idempotent: closing a closed or failed stream does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Network`] if the stream was open but its writer
    /// is already gone.  The stream is `Closed` either way.
    pub fn close(&self) -> Result<(), ChannelError> {
        let was_open = self.state.get() == ChannelState::Open;
        if !self.state.transition(ChannelState::Closed) {
            return Ok(());
        }
        if was_open {
            self.control
                .try_send(ControlCommand::Stop)
                .map_err(|e| ChannelError::Network(format!("stop not sent: {e}")))?;
        }
        Ok(())
    }
}

/// Sending side of a stream's latest-frame slot.
pub type FrameSlot = watch::Sender<Option<StreamFrame>>;

/// An open stream: its handle plus the event feed.
#[derive(Debug)]
pub struct StreamSubscription {
    pub handle: StreamHandle,
    events: mpsc::Receiver<ChannelEvent>,
    frames: watch::Receiver<Option<StreamFrame>>,
}

impl StreamSubscription {
    /// Builds a subscription over a queued event lane and a frame slot.
    ///
    /// Used by [`StreamChannel`] implementations.
    pub fn new(
        handle: StreamHandle,
        events: mpsc::Receiver<ChannelEvent>,
        frames: watch::Receiver<Option<StreamFrame>>,
    ) -> Self {
        Self { handle, events, frames }
    }

    /// Waits for the next event.
    ///
    /// Queued events come first.  A frame is only yielded if it has not been
    /// seen yet, and it is always the newest one.  Returns `None` once the
    /// channel's tasks are gone.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => return Some(event),
                Ok(()) = self.frames.changed() => {
                    if let Some(frame) = self.frames.borrow_and_update().clone() {
                        return Some(ChannelEvent::Frame(frame));
                    }
                }
                else => return None,
            }
        }
    }

    /// The newest frame if it has not been yielded by [`next`](Self::next).
    pub fn take_frame(&mut self) -> Option<StreamFrame> {
        let latest = self.frames.borrow_and_update();
        if latest.has_changed() {
            latest.clone()
        } else {
            None
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Opens screen streams for devices.
#[async_trait]
pub trait StreamChannel: Send + Sync {
    /// Connects to the stream of `device_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionError`] if the handshake does not
    /// complete within the channel's timeout.
    async fn open(&self, device_id: &str) -> Result<StreamSubscription, ChannelError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{ImageFormat, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn open_handle() -> (StreamHandle, mpsc::Receiver<ControlCommand>) {
        let state = StateCell::new();
        assert!(state.transition(ChannelState::Connecting));
        assert!(state.transition(ChannelState::Open));
        let (tx, rx) = mpsc::channel(4);
        (StreamHandle::new("dev1", state, tx), rx)
    }

    #[test]
    fn test_allowed_transitions() {
        use ChannelState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Open.can_transition_to(Closed));
        assert!(Open.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        use ChannelState::*;
        for next in [Idle, Connecting, Open, Closed, Failed] {
            assert!(!Closed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(!Idle.can_transition_to(Open));
    }

    #[test]
    fn test_state_cell_refuses_invalid_transition() {
        let cell = StateCell::new();
        assert!(!cell.transition(ChannelState::Open));
        assert_eq!(cell.get(), ChannelState::Idle);
    }

    #[test]
    fn test_close_sends_stop_once() {
        // Arrange
        let (handle, mut rx) = open_handle();

        // Act
        handle.close().unwrap();
        handle.close().unwrap();

        // Assert
        assert_eq!(handle.state(), ChannelState::Closed);
        assert_eq!(rx.try_recv(), Ok(ControlCommand::Stop));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_on_failed_stream_is_noop() {
        let (handle, mut rx) = open_handle();
        handle.state.transition(ChannelState::Failed);

        handle.close().unwrap();

        assert_eq!(handle.state(), ChannelState::Failed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_with_writer_gone_is_network_error_but_closes() {
        let (handle, rx) = open_handle();
        drop(rx);

        assert!(matches!(handle.close(), Err(ChannelError::Network(_))));
        assert_eq!(handle.state(), ChannelState::Closed);
    }

    #[test]
    fn test_frame_reads_png_dimensions() {
        // Arrange
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        // Act
        let frame = StreamFrame::from_image("dev1", png(36, 80), at).unwrap();

        // Assert
        assert_eq!((frame.width, frame.height), (36, 80));
        assert_eq!(frame.format, "png");
        assert_eq!(frame.timestamp, at);
    }

    #[test]
    fn test_frame_rejects_non_image_bytes() {
        let result = StreamFrame::from_image("dev1", b"hello".to_vec(), Utc::now());
        assert!(matches!(result, Err(ChannelError::InvalidFrame(_))));
    }

    fn frame_of_width(width: u32) -> StreamFrame {
        StreamFrame {
            device_id: "dev1".to_string(),
            image: Vec::new(),
            format: "png",
            width,
            height: 80,
            timestamp: Utc::now(),
        }
    }

    fn subscription() -> (StreamSubscription, mpsc::Sender<ChannelEvent>, FrameSlot) {
        let (handle, _control) = open_handle();
        let (event_tx, events) = mpsc::channel(4);
        let (frame_tx, frames) = watch::channel(None);
        (StreamSubscription::new(handle, events, frames), event_tx, frame_tx)
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_only_newest_frame() {
        // Arrange: three frames arrive while nobody is reading
        let (mut sub, _events, frames) = subscription();
        for width in 1..=3 {
            frames.send_replace(Some(frame_of_width(width)));
        }

        // Act
        let first = sub.next().await;

        // Assert: the newest frame, and nothing stale behind it
        assert!(matches!(first, Some(ChannelEvent::Frame(f)) if f.width == 3));
        assert!(sub.take_frame().is_none());
    }

    #[tokio::test]
    async fn test_queued_events_come_before_frames() {
        // Arrange
        let (mut sub, events, frames) = subscription();
        frames.send_replace(Some(frame_of_width(7)));
        events
            .send(ChannelEvent::RemoteError {
                message: "Screen capture failed".to_string(),
            })
            .await
            .unwrap();

        // Act
        let first = sub.next().await;
        let second = sub.next().await;

        // Assert
        assert!(matches!(first, Some(ChannelEvent::RemoteError { .. })));
        assert!(matches!(second, Some(ChannelEvent::Frame(f)) if f.width == 7));
    }

    #[tokio::test]
    async fn test_feed_ends_when_channel_tasks_are_gone() {
        let (mut sub, events, frames) = subscription();
        frames.send_replace(Some(frame_of_width(9)));
        drop(frames);
        drop(events);

        assert!(matches!(sub.next().await, Some(ChannelEvent::Frame(f)) if f.width == 9));
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn test_take_frame_returns_unseen_frame_once() {
        let (mut sub, _events, frames) = subscription();
        assert!(sub.take_frame().is_none());

        frames.send_replace(Some(frame_of_width(5)));

        assert_eq!(sub.take_frame().map(|f| f.width), Some(5));
        assert!(sub.take_frame().is_none());
    }

    #[test]
    fn test_frame_rejects_bad_base64() {
        let result = StreamFrame::decode("dev1", "%%%", Utc::now());
        assert!(matches!(result, Err(ChannelError::InvalidFrame(_))));
    }
}
