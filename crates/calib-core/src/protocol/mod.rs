//! Streaming wire protocol: JSON message types and their text codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, decode_server_message, encode, ProtocolError};
pub use messages::*;
