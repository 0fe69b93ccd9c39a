//! Per-session journal: an on-disk trail of one calibration run.
//!
//! Layout of one session directory:
//!
//! ```text
//! <root>/20260301_091500_3f2a9c1e/
//!   logs/events.jsonl               one JSON event per line
//!   screenshots/001_091512_click.png
//!   screenshots/002_091520_click.png
//!   summary.json                    written by `finalize`
//! ```
//!
//! A journal is a debugging aid.  Callers log its errors and carry on; a
//! full disk never fails a calibration.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use calib_core::{DevicePoint, ElementType, SessionId};

use super::stream_channel::StreamFrame;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode journal entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Creates one [`SessionJournal`] directory per session under `root`.
#[derive(Debug, Clone)]
pub struct JournalRoot {
    root: PathBuf,
}

impl JournalRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates `<root>/<YYYYmmdd_HHMMSS>_<first 8 of id>/` with its `logs`
    /// and `screenshots` sub-directories.
    pub fn begin(&self, session_id: SessionId, started_at: DateTime<Utc>) -> Result<SessionJournal, JournalError> {
        let short_id: String = session_id.simple().to_string().chars().take(8).collect();
        let dir = self
            .root
            .join(format!("{}_{short_id}", started_at.format("%Y%m%d_%H%M%S")));

        for sub in ["logs", "screenshots"] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).map_err(|source| JournalError::Io { path, source })?;
        }
        info!("session {session_id}: journal at {}", dir.display());

        Ok(SessionJournal {
            session_id,
            dir,
            event_count: 0,
            screenshot_count: 0,
        })
    }
}

// ── Entries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
struct Coordinates {
    x: u32,
    y: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
enum Entry<'a> {
    Click {
        step: usize,
        element_type: ElementType,
        element_name: &'a str,
        coordinates: Coordinates,
    },
    Error {
        error_type: &'a str,
        message: &'a str,
    },
    Websocket {
        event: &'a str,
        message: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct Line<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    entry: Entry<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<&'a Path>,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalSummary {
    pub session_id: SessionId,
    pub success: bool,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub total_events: usize,
    pub screenshots_saved: usize,
    pub session_directory: PathBuf,
    pub timestamp: DateTime<Utc>,
}

// ── Session journal ───────────────────────────────────────────────────────────

/// The open journal of one session.
#[derive(Debug)]
pub struct SessionJournal {
    session_id: SessionId,
    dir: PathBuf,
    event_count: usize,
    screenshot_count: usize,
}

impl SessionJournal {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Logs an accepted click and saves the frame it was made on.
    ///
    /// `step` is 1-based, as shown to the operator.
    ///
    /// Returns the path of the saved screenshot, if a frame was given.
    pub fn log_click(
        &mut self,
        step: usize,
        element_type: ElementType,
        element_name: &str,
        point: DevicePoint,
        frame: Option<&StreamFrame>,
    ) -> Result<Option<PathBuf>, JournalError> {
        let at = Utc::now();
        let screenshot = match frame {
            Some(frame) => Some(self.save_screenshot(frame, "click", at)?),
            None => None,
        };
        self.append(
            Line {
                timestamp: at,
                entry: Entry::Click {
                    step,
                    element_type,
                    element_name,
                    coordinates: Coordinates {
                        x: point.x,
                        y: point.y,
                    },
                },
                screenshot: screenshot.as_deref(),
            },
        )?;
        Ok(screenshot)
    }

    pub fn log_error(&mut self, error_type: &str, message: &str) -> Result<(), JournalError> {
        self.append(Line {
            timestamp: Utc::now(),
            entry: Entry::Error { error_type, message },
            screenshot: None,
        })
    }

    /// Logs a stream lifecycle event (`connected`, `disconnected`, ...).
    pub fn log_websocket(&mut self, event: &str, message: &str) -> Result<(), JournalError> {
        self.append(Line {
            timestamp: Utc::now(),
            entry: Entry::Websocket { event, message },
            screenshot: None,
        })
    }

    /// Writes `summary.json` and closes the journal.
    pub fn finalize(
        self,
        success: bool,
        total_steps: usize,
        completed_steps: usize,
    ) -> Result<JournalSummary, JournalError> {
        let summary = JournalSummary {
            session_id: self.session_id,
            success,
            total_steps,
            completed_steps,
            total_events: self.event_count,
            screenshots_saved: self.screenshot_count,
            session_directory: self.dir.clone(),
            timestamp: Utc::now(),
        };
        let path = self.dir.join("summary.json");
        let text = serde_json::to_string_pretty(&summary)?;
        fs::write(&path, text).map_err(|source| JournalError::Io { path, source })?;

        info!(
            "session {}: journal finalized, {completed_steps}/{total_steps} step(s)",
            self.session_id
        );
        Ok(summary)
    }

    fn save_screenshot(
        &mut self,
        frame: &StreamFrame,
        event: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, JournalError> {
        let number = self.screenshot_count + 1;
        let name = format!("{number:03}_{}_{event}.{}", at.format("%H%M%S"), frame.format);
        let path = self.dir.join("screenshots").join(name);
        fs::write(&path, &frame.image).map_err(|source| JournalError::Io {
            path: path.clone(),
            source,
        })?;
        self.screenshot_count = number;
        debug!("session {}: screenshot saved to {}", self.session_id, path.display());
        Ok(path)
    }

    fn append(&mut self, line: Line<'_>) -> Result<(), JournalError> {
        let mut text = serde_json::to_string(&line)?;
        text.push('\n');

        let path = self.dir.join("logs").join("events.jsonl");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| JournalError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(text.as_bytes())
            .map_err(|source| JournalError::Io { path, source })?;

        self.event_count += 1;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
