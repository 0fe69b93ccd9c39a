//! Screen calibration streaming agent: entry point.
//!
//! This binary runs next to the physical devices and streams each device's
//! screen to operator consoles over WebSocket, one connection per device at
//! `ws://<host>:<port>/ws/<device_id>`.
//!
//! # Usage
//!
//! ```text
//! calib-agent [OPTIONS]
//!
//! Options:
//!   --port              <PORT>  WebSocket listener port [default: 24900]
//!   --bind              <IP>    Address to bind [default: 0.0.0.0]
//!   --snapshot-dir      <DIR>   Screenshot root, one sub-directory per device [default: snapshots]
//!   --frame-interval-ms <MS>    Delay between frames [default: 500]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Default     | Description                  |
//! |---------------------------|-------------|------------------------------|
//! | `CALIB_AGENT_PORT`        | `24900`     | WebSocket listener port      |
//! | `CALIB_AGENT_BIND`        | `0.0.0.0`   | Bind address                 |
//! | `CALIB_SNAPSHOT_DIR`      | `snapshots` | Screenshot root directory    |
//! | `CALIB_FRAME_INTERVAL_MS` | `500`       | Delay between frames (ms)    |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use calib_agent::domain::AgentConfig;
use calib_agent::infrastructure::device::SnapshotDirectory;
use calib_agent::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Screen calibration streaming agent.
///
/// Streams device screenshots to operator consoles over WebSocket.
#[derive(Debug, Parser)]
#[command(
    name = "calib-agent",
    about = "Streams device screens to screen calibration consoles",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = 24900, env = "CALIB_AGENT_PORT")]
    port: u16,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `127.0.0.1` to accept only local consoles.
    #[arg(long, default_value = "0.0.0.0", env = "CALIB_AGENT_BIND")]
    bind: String,

    /// Root directory holding one screenshot sub-directory per device id.
    #[arg(long, default_value = "snapshots", env = "CALIB_SNAPSHOT_DIR")]
    snapshot_dir: PathBuf,

    /// Delay between two frames of a stream, in milliseconds.
    #[arg(long, default_value_t = 500, env = "CALIB_FRAME_INTERVAL_MS")]
    frame_interval_ms: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into an [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address or
    /// `--frame-interval-ms` is zero.
    fn into_agent_config(self) -> anyhow::Result<AgentConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| {
                format!("invalid WebSocket bind address: '{}:{}'", self.bind, self.port)
            })?;

        if self.frame_interval_ms == 0 {
            bail!("--frame-interval-ms must be greater than zero");
        }

        Ok(AgentConfig {
            ws_bind_addr,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            snapshot_dir: self.snapshot_dir,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_agent_config()?;

    info!(
        "screen calibration agent starting: ws={}, snapshots={}, interval={:?}",
        config.ws_bind_addr,
        config.snapshot_dir.display(),
        config.frame_interval
    );

    let source = Arc::new(SnapshotDirectory::new(config.snapshot_dir.clone()));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The accept loop checks this flag every 200 ms and exits cleanly.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, source, running).await?;

    info!("screen calibration agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
