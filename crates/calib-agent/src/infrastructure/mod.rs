//! Infrastructure layer: WebSocket server and screen sources.

pub mod device;
pub mod ws_server;

pub use ws_server::{run_server, serve};
