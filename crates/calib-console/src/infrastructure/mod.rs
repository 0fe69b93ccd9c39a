//! Infrastructure layer for the operator console.
//!
//! Contains the adapters: profile storage and TOML configuration, the
//! WebSocket streaming client, the on-disk session journal, and the text
//! command bridge used by the console binary.
//!
//! **Dependency rule**: this layer may depend on `calib_core`, but MUST NOT be
//! imported by `calib_core`.

pub mod console_bridge;
pub mod journal;
pub mod storage;
pub mod stream_channel;
