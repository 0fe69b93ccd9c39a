//! Application layer: rules for one streaming session, independent of the
//! WebSocket library.

pub mod stream_service;

pub use stream_service::{
    capture_failed_message, classify_client_text, connect_failed_message, device_id_from_path,
    ClientAction, StreamError,
};
