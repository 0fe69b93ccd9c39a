//! Screen sources: where the agent's frames come from.
//!
//! Talking to real hardware (USB debugging bridges, emulators) is outside this
//! crate.  The [`ScreenSource`] trait is the seam: production deployments plug
//! in a capture backend, development uses [`SnapshotDirectory`], and tests use
//! [`mock::ScriptedScreen`].

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod snapshot_dir;

pub use snapshot_dir::SnapshotDirectory;

/// Errors produced by a screen source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No device with this id is reachable.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device is reachable but produced no frame.
    #[error("device {0} has no frame available")]
    NoFrame(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend-specific failure.
    #[error("capture failed: {0}")]
    Backend(String),
}

/// A source of encoded screenshots, keyed by device id.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Prepares `device_id` for streaming.  Called once per stream.
    async fn open(&self, device_id: &str) -> Result<(), CaptureError>;

    /// Takes one screenshot and returns the encoded PNG or JPEG bytes.
    async fn capture(&self, device_id: &str) -> Result<Vec<u8>, CaptureError>;
}
