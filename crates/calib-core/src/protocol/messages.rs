//! JSON message types for the screen streaming WebSocket.
//!
//! # Message flow
//!
//! ```text
//! Agent   → Console: ServerMessage  (connected, screenshot, error)
//! Console → Agent:   ClientMessage  (stop)
//! ```
//!
//! # JSON discriminant
//!
//! Every message is one JSON object per WebSocket text frame, with a `"type"`
//! field naming the variant:
//!
//! ```json
//! {"type":"connected","device_id":"R58M123","message":"Screen streaming started"}
//! {"type":"screenshot","device_id":"R58M123","screenshot":"iVBORw0K...","timestamp":"2026-03-01T09:00:00Z"}
//! {"type":"error","message":"Failed to connect to device: R58M123"}
//! {"type":"stop"}
//! ```
//!
//! Two enums, one per direction, make it a compile-time error to send an
//! agent-only message from the console.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::ProtocolError;

/// Greeting sent by the agent once the device stream is up.
pub const STREAM_STARTED: &str = "Screen streaming started";

// ── Agent → Console ───────────────────────────────────────────────────────────

/// All messages the agent sends on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The device was opened and frames will follow.
    Connected { device_id: String, message: String },

    /// One encoded frame.
    Screenshot {
        device_id: String,
        /// Base64 (standard alphabet, padded) of the PNG or JPEG bytes.
        screenshot: String,
        timestamp: DateTime<Utc>,
    },

    /// A remote failure.  Not a transport failure: the agent sends this and
    /// then usually closes the stream.
    Error { message: String },
}

impl ServerMessage {
    pub fn connected(device_id: impl Into<String>) -> Self {
        ServerMessage::Connected {
            device_id: device_id.into(),
            message: STREAM_STARTED.to_string(),
        }
    }

    /// Builds a `screenshot` message, base64-encoding `image`.
    pub fn screenshot(device_id: impl Into<String>, image: &[u8], timestamp: DateTime<Utc>) -> Self {
        ServerMessage::Screenshot {
            device_id: device_id.into(),
            screenshot: STANDARD.encode(image),
            timestamp,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Returns the wire name of the variant, for logging without payloads.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Screenshot { .. } => "screenshot",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// Decodes the base64 payload of a `screenshot` message.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidFrameEncoding`] if `payload` is not valid base64.
pub fn decode_frame_payload(payload: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(payload)
        .map_err(|e| ProtocolError::InvalidFrameEncoding(e.to_string()))
}

// ── Console → Agent ───────────────────────────────────────────────────────────

/// All messages the console sends on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// End the stream cleanly.
    Stop,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
