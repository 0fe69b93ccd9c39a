//! calib-agent library crate.
//!
//! The agent runs next to the physical devices.  It accepts one WebSocket per
//! device at `/ws/<device_id>` and pushes the device's screen as a stream of
//! base64 `screenshot` messages until the console sends `stop` or hangs up.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Operator console (JSON over WebSocket)
//!         ↕
//! [calib-agent]
//!   ├── domain/           AgentConfig
//!   ├── application/      Path routing and message rules
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop and frame pump (tokio-tungstenite)
//!         └── device/     ScreenSource trait, screenshot directory, scripted mock
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `calib-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: runtime configuration.
pub mod domain;

/// Application layer: routing and message rules.
pub mod application;

/// Infrastructure layer: WebSocket server and screen sources.
pub mod infrastructure;
