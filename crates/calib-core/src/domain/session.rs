//! Calibration session record and step transitions.
//!
//! A [`CalibrationSession`] is the transient state of one calibration run.
//! It never touches storage: the console's session service validates a
//! submission here, writes the coordinate through its profile store, and
//! only then calls [`CalibrationSession::advance`].
//!
//! # State machine
//!
//! ```text
//!  NotStarted ──activate──► Active ──advance (last step)──► Completed
//!                              │
//!                              └──────cancel──────────────► Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal.  `current_step` only ever moves
//! forward, one step per accepted submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::element::ElementType;
use super::plan::{CalibrationPlan, PlanStep};
use super::profile::Resolution;

/// Unique identifier of a calibration session.
pub type SessionId = Uuid;

/// Element name reported by a completed session.
pub const COMPLETED_ELEMENT_NAME: &str = "Calibration Complete";

/// Errors raised by session operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {0} has not been started")]
    SessionNotStarted(SessionId),

    #[error("session {session_id} is already {state:?}")]
    SessionAlreadyTerminal {
        session_id: SessionId,
        state: SessionState,
    },

    #[error("step mismatch: current step expects {expected}, got {submitted}")]
    StepMismatch {
        expected: ElementType,
        submitted: ElementType,
    },

    #[error("coordinate ({x}, {y}) outside {width}x{height}")]
    CoordinateOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("profile store error: {0}")]
    Storage(String),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Active,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

/// The operator's submission for the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub session_id: SessionId,
    pub element_type: ElementType,
    pub x: u32,
    pub y: u32,
    pub operator: String,
    pub submitted_at: DateTime<Utc>,
}

/// What an accepted submission did to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Moved to the next step.
    Advanced { current_step: usize },
    /// The last step was accepted.
    Completed { mean_confidence: f64 },
}

/// Transient state of one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub session_id: SessionId,
    pub profile_id: String,
    pub operator: String,
    /// Zero-based index of the step awaiting a submission.
    pub current_step: usize,
    pub total_steps: usize,
    /// `None` once the session is completed.
    pub element_type: Option<ElementType>,
    pub element_name: String,
    pub instructions: String,
    pub help_text: String,
    /// Reference to the frame the last accepted click was made on.
    pub screenshot: Option<String>,
    pub completed: bool,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    confidence_sum: f64,
}

impl CalibrationSession {
    /// Creates a session in `NotStarted`, positioned on the plan's first step.
    pub fn new(
        session_id: SessionId,
        profile_id: impl Into<String>,
        operator: impl Into<String>,
        plan: &CalibrationPlan,
        now: DateTime<Utc>,
    ) -> Self {
        let mut session = Self {
            session_id,
            profile_id: profile_id.into(),
            operator: operator.into(),
            current_step: 0,
            total_steps: plan.len(),
            element_type: None,
            element_name: String::new(),
            instructions: String::new(),
            help_text: String::new(),
            screenshot: None,
            completed: false,
            state: SessionState::NotStarted,
            created_at: now,
            confidence_sum: 0.0,
        };
        session.load_step(plan);
        session
    }

    /// Moves `NotStarted → Active`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionAlreadyTerminal`] for a terminal session.
    /// Activating an already active session is a no-op.
    pub fn activate(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::NotStarted => {
                self.state = SessionState::Active;
                Ok(())
            }
            SessionState::Active => Ok(()),
            state => Err(SessionError::SessionAlreadyTerminal {
                session_id: self.session_id,
                state,
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Validates a submission against the current step without changing state.
    ///
    /// Checks run in order: session active, element type matches the
    /// current step, point inside `resolution`.
    pub fn check_submission(
        &self,
        result: &CalibrationResult,
        resolution: Resolution,
    ) -> Result<(), SessionError> {
        self.ensure_active()?;

        let expected = self
            .element_type
            .ok_or(SessionError::SessionAlreadyTerminal {
                session_id: self.session_id,
                state: self.state,
            })?;
        if result.element_type != expected {
            return Err(SessionError::StepMismatch {
                expected,
                submitted: result.element_type,
            });
        }

        if !resolution.contains(result.x, result.y) {
            return Err(SessionError::CoordinateOutOfBounds {
                x: result.x,
                y: result.y,
                width: resolution.width,
                height: resolution.height,
            });
        }
        Ok(())
    }

    /// Accepts the current step, recorded with `confidence`.
    ///
    /// Call only after [`check_submission`](Self::check_submission) passed and
    /// the coordinate was stored.
    pub fn advance(&mut self, plan: &CalibrationPlan, confidence: f64) -> Result<StepOutcome, SessionError> {
        self.ensure_active()?;

        self.confidence_sum += confidence;
        self.current_step += 1;

        if self.current_step >= self.total_steps {
            self.state = SessionState::Completed;
            self.completed = true;
            self.load_step(plan);
            return Ok(StepOutcome::Completed {
                mean_confidence: self.mean_confidence(),
            });
        }

        self.load_step(plan);
        Ok(StepOutcome::Advanced {
            current_step: self.current_step,
        })
    }

    /// Moves a non-terminal session to `Cancelled`.
    ///
    /// Returns `false` (and changes nothing) if the session was already terminal.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = SessionState::Cancelled;
        true
    }

    /// Mean confidence of the steps accepted so far, `0.0` before the first one.
    pub fn mean_confidence(&self) -> f64 {
        if self.current_step == 0 {
            0.0
        } else {
            self.confidence_sum / self.current_step as f64
        }
    }

    /// The plan step awaiting a submission.
    pub fn current_plan_step<'p>(&self, plan: &'p CalibrationPlan) -> Option<&'p PlanStep> {
        if self.is_terminal() {
            return None;
        }
        plan.step(self.current_step)
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::NotStarted => Err(SessionError::SessionNotStarted(self.session_id)),
            state => Err(SessionError::SessionAlreadyTerminal {
                session_id: self.session_id,
                state,
            }),
        }
    }

    fn load_step(&mut self, plan: &CalibrationPlan) {
        match plan.step(self.current_step).filter(|_| !self.completed) {
            Some(step) => {
                self.element_type = Some(step.element_type);
                self.element_name = step.element_name.clone();
                self.instructions = step.instructions.clone();
                self.help_text = step.help_text.clone();
            }
            None => {
                self.element_type = None;
                self.element_name = COMPLETED_ELEMENT_NAME.to_string();
                self.instructions = "All calibration steps are complete.".to_string();
                self.help_text.clear();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
