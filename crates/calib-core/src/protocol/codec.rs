//! Text codec for the streaming protocol.
//!
//! One message per WebSocket text frame.  Decoding first looks at the `type`
//! field so that an unknown variant is reported as
//! [`ProtocolError::UnknownMessageType`] rather than an opaque serde error.

use serde::Serialize;
use thiserror::Error;

use super::messages::{ClientMessage, ServerMessage};

const SERVER_TYPES: [&str; 3] = ["connected", "screenshot", "error"];
const CLIENT_TYPES: [&str; 1] = ["stop"];

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not a JSON object.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The object has no string `type` field.
    #[error("message has no type field")]
    MissingType,

    /// The `type` field names no known variant for this direction.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A known variant with missing or mistyped fields.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },

    /// The frame payload is not valid base64.
    #[error("invalid frame encoding: {0}")]
    InvalidFrameEncoding(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Encodes a message as one JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a message sent by the agent.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    decode_tagged(text, &SERVER_TYPES)
}

/// Decodes a message sent by the console.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    decode_tagged(text, &CLIENT_TYPES)
}

fn decode_tagged<T: serde::de::DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !known.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownMessageType(kind));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedPayload {
        kind,
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
