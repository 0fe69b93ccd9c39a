//! Agent configuration types.
//!
//! [`AgentConfig`] is the single source of truth for all runtime settings.
//! It is built from CLI arguments in `main.rs` or from defaults in tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// All runtime configuration for the streaming agent.
///
/// # Example
///
/// ```rust
/// use calib_agent::domain::AgentConfig;
///
/// let cfg = AgentConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 24900);
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The address and port the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Delay between two screenshots of one stream.
    ///
    /// The default of 500 ms gives roughly 2 frames per second, enough for an
    /// operator to follow screen transitions without flooding the link.
    pub frame_interval: Duration,

    /// Root directory of the screenshot source: one sub-directory per device id.
    pub snapshot_dir: PathBuf,
}

impl Default for AgentConfig {
    /// | Field           | Default             |
    /// |-----------------|---------------------|
    /// | ws_bind_addr    | `0.0.0.0:24900`     |
    /// | frame_interval  | 500 ms              |
    /// | snapshot_dir    | `./snapshots`       |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 24900)),
            frame_interval: Duration::from_millis(500),
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
