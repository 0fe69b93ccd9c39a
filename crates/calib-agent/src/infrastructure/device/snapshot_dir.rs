//! Screen source backed by a directory of screenshots.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   R58M123/
//!     001_home.png
//!     002_menu.png
//!   emulator-5554/
//!     home.jpg
//! ```
//!
//! Each capture returns the next image of the device's directory in file-name
//! order and wraps around at the end, which is enough to rehearse a
//! calibration walk-through without hardware.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{CaptureError, ScreenSource};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Cycles through the screenshots stored under `<root>/<device_id>/`.
pub struct SnapshotDirectory {
    root: PathBuf,
    /// Next index per device.
    cursors: Mutex<HashMap<String, usize>>,
}

impl SnapshotDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn device_dir(&self, device_id: &str) -> Result<PathBuf, CaptureError> {
        // Device ids come from a URL path; refuse anything that walks the tree.
        if device_id.is_empty()
            || device_id.contains(['/', '\\'])
            || device_id == "."
            || device_id == ".."
        {
            return Err(CaptureError::DeviceNotFound(device_id.to_string()));
        }
        Ok(self.root.join(device_id))
    }

    async fn list_images(&self, dir: &Path, device_id: &str) -> Result<Vec<PathBuf>, CaptureError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaptureError::DeviceNotFound(device_id.to_string()))
            }
            Err(source) => {
                return Err(CaptureError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut images = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if is_image(&path) {
                        images.push(path);
                    }
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(CaptureError::Io {
                        path: dir.to_path_buf(),
                        source,
                    })
                }
            }
        }
        images.sort();
        Ok(images)
    }

    fn next_index(&self, device_id: &str, len: usize) -> usize {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let cursor = cursors.entry(device_id.to_string()).or_insert(0);
        let index = *cursor % len;
        *cursor = index + 1;
        index
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl ScreenSource for SnapshotDirectory {
    async fn open(&self, device_id: &str) -> Result<(), CaptureError> {
        let dir = self.device_dir(device_id)?;
        let images = self.list_images(&dir, device_id).await?;
        if images.is_empty() {
            return Err(CaptureError::NoFrame(device_id.to_string()));
        }
        debug!("device {device_id}: {} snapshot(s) in {}", images.len(), dir.display());
        Ok(())
    }

    async fn capture(&self, device_id: &str) -> Result<Vec<u8>, CaptureError> {
        let dir = self.device_dir(device_id)?;
        let images = self.list_images(&dir, device_id).await?;
        if images.is_empty() {
            return Err(CaptureError::NoFrame(device_id.to_string()));
        }
        let path = &images[self.next_index(device_id, images.len())];
        tokio::fs::read(path).await.map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
