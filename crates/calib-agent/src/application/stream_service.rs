//! Routing and message rules for a device stream.
//!
//! These functions are pure so the WebSocket server stays a thin shell
//! around them and tests need no sockets.

use std::fmt;

use calib_core::protocol::{decode_client_message, ClientMessage, ProtocolError, ServerMessage};
use thiserror::Error;

/// Path prefix of the streaming endpoint.
pub const STREAM_PATH_PREFIX: &str = "/ws/";

/// Errors raised while routing a stream request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    #[error("request path {0:?} does not match /ws/<device_id>")]
    InvalidPath(String),
}

/// Extracts the device id from a request path of the form `/ws/<device_id>`.
///
/// A query string is ignored.  The id must be non-empty and contain no `/`.
///
/// # Errors
///
/// Returns [`StreamError::InvalidPath`] for any other path.
pub fn device_id_from_path(path: &str) -> Result<String, StreamError> {
    let without_query = path.split('?').next().unwrap_or_default();
    match without_query.strip_prefix(STREAM_PATH_PREFIX) {
        Some(id) if !id.is_empty() && !id.contains('/') => Ok(id.to_string()),
        _ => Err(StreamError::InvalidPath(path.to_string())),
    }
}

/// The `error` message sent when a device cannot be opened.
pub fn connect_failed_message(device_id: &str) -> ServerMessage {
    ServerMessage::error(format!("Failed to connect to device: {device_id}"))
}

/// The `error` message sent when a screenshot cannot be taken mid-stream.
pub fn capture_failed_message(err: impl fmt::Display) -> ServerMessage {
    ServerMessage::error(format!("Screen capture failed: {err}"))
}

/// What the frame pump should do with a text frame from the console.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// End the stream.
    Stop,
    /// Not understood; log it and keep streaming.
    Ignore(ProtocolError),
}

/// Classifies a text frame received from the console.
pub fn classify_client_text(text: &str) -> ClientAction {
    match decode_client_message(text) {
        Ok(ClientMessage::Stop) => ClientAction::Stop,
        Err(e) => ClientAction::Ignore(e),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
