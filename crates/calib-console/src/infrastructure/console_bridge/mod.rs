//! Console command bridge: turns operator input lines into commands and
//! renders session state back as text.
//!
//! The binary is the only consumer of this module; the application layer
//! never sees raw input.
//!
//! # Commands
//!
//! ```text
//! start  <profile_id>               start (or restart) calibration of a profile
//! click  <x> <y> <width> <height>   pointer position on a surface of the given render size
//! status                            print the current step
//! guide                             print every step of the plan
//! cancel                            cancel the running session
//! reconnect                         reopen the screen stream
//! quit                              leave the console
//! ```
//!
//! A rendered screenshot is usually smaller than the device screen, so a
//! click always carries the size the frame was drawn at.

use thiserror::Error;

use calib_core::{CalibrationSession, GuideEntry, PointerPosition, SessionState};

use crate::application::orchestrate_session::Connectivity;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command: {0} (try: start, click, status, guide, cancel, reconnect, quit)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not a number: {0}")]
    NotANumber(String),
}

/// A pointer event on the rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceClick {
    pub pointer: PointerPosition,
    pub render_width: f64,
    pub render_height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start { profile_id: String },
    Click(SurfaceClick),
    Status,
    Guide,
    Cancel,
    Reconnect,
    Quit,
}

/// Parses one input line.  Returns `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("start", [profile_id]) => ConsoleCommand::Start {
            profile_id: (*profile_id).to_string(),
        },
        ("start", _) => return Err(CommandError::Usage("start <profile_id>")),
        ("click", [x, y, w, h]) => ConsoleCommand::Click(SurfaceClick {
            pointer: PointerPosition::new(number(x)?, number(y)?),
            render_width: number(w)?,
            render_height: number(h)?,
        }),
        ("click", _) => return Err(CommandError::Usage("click <x> <y> <width> <height>")),
        ("status", []) => ConsoleCommand::Status,
        ("guide", []) => ConsoleCommand::Guide,
        ("cancel", []) => ConsoleCommand::Cancel,
        ("reconnect", []) => ConsoleCommand::Reconnect,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn number(word: &str) -> Result<f64, CommandError> {
    word.parse::<f64>()
        .map_err(|_| CommandError::NotANumber(word.to_string()))
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// One-line description of where a session stands.
pub fn describe_session(session: &CalibrationSession, connectivity: Connectivity) -> String {
    match session.state {
        SessionState::Completed => format!(
            "[{}] calibration of {} complete ({} steps)",
            session.session_id, session.profile_id, session.total_steps
        ),
        SessionState::Cancelled => format!(
            "[{}] calibration of {} cancelled at step {}/{}",
            session.session_id,
            session.profile_id,
            session.current_step + 1,
            session.total_steps
        ),
        SessionState::NotStarted | SessionState::Active => format!(
            "[{}] step {}/{}: {} - {} (stream {})",
            session.session_id,
            session.current_step + 1,
            session.total_steps,
            session.element_name,
            session.instructions,
            connectivity
        ),
    }
}

/// The operator guide, one numbered line per step.
pub fn render_guide(entries: &[GuideEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.help_text.is_empty() {
                format!("{:>2}. {}: {}", e.step_number, e.element_name, e.instructions)
            } else {
                format!(
                    "{:>2}. {}: {} ({})",
                    e.step_number, e.element_name, e.instructions, e.help_text
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
