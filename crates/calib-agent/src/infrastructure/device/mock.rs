//! Scripted screen source for tests.
//!
//! Lets tests decide which devices exist, which frames they return, and when
//! opening or capturing fails, without any files or hardware.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CaptureError, ScreenSource};

#[derive(Default)]
struct ScriptedDevice {
    frames: Vec<Vec<u8>>,
    fail_open: bool,
    /// Capture number (zero-based) that fails, if any.
    fail_capture_at: Option<usize>,
    captures: usize,
}

/// A [`ScreenSource`] driven entirely by the test.
#[derive(Default)]
pub struct ScriptedScreen {
    devices: Mutex<HashMap<String, ScriptedDevice>>,
}

impl ScriptedScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device_id` returning `frames` in a loop.
    pub fn with_frames(self, device_id: &str, frames: Vec<Vec<u8>>) -> Self {
        self.lock().entry(device_id.to_string()).or_default().frames = frames;
        self
    }

    /// Registers `device_id` as present but failing to open.
    pub fn with_open_failure(self, device_id: &str) -> Self {
        self.lock().entry(device_id.to_string()).or_default().fail_open = true;
        self
    }

    /// Makes the `n`-th capture (zero-based) of `device_id` fail.
    pub fn with_capture_failure_at(self, device_id: &str, n: usize) -> Self {
        self.lock().entry(device_id.to_string()).or_default().fail_capture_at = Some(n);
        self
    }

    /// Number of captures attempted for `device_id`.
    pub fn capture_count(&self, device_id: &str) -> usize {
        self.lock().get(device_id).map(|d| d.captures).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScriptedDevice>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ScreenSource for ScriptedScreen {
    async fn open(&self, device_id: &str) -> Result<(), CaptureError> {
        match self.lock().get(device_id) {
            None => Err(CaptureError::DeviceNotFound(device_id.to_string())),
            Some(d) if d.fail_open => Err(CaptureError::Backend(format!(
                "scripted open failure for {device_id}"
            ))),
            Some(_) => Ok(()),
        }
    }

    async fn capture(&self, device_id: &str) -> Result<Vec<u8>, CaptureError> {
        let mut devices = self.lock();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| CaptureError::DeviceNotFound(device_id.to_string()))?;

        let n = device.captures;
        device.captures += 1;

        if device.fail_capture_at == Some(n) {
            return Err(CaptureError::Backend(format!(
                "scripted capture failure #{n} for {device_id}"
            )));
        }
        if device.frames.is_empty() {
            return Err(CaptureError::NoFrame(device_id.to_string()));
        }
        Ok(device.frames[n % device.frames.len()].clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
