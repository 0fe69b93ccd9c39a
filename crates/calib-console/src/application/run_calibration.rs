//! Use case: run a calibration session over a [`ProfileStore`].
//!
//! [`CalibrationSessions`] owns the table of live sessions and drives each
//! one through the plan:
//!
//! ```text
//! start(profile, operator)       NotStarted → Active, step 0 loaded
//! submit(result)                 validate → upsert coordinate → advance
//!                                last step: profile marked calibrated, then Completed
//! cancel(session)                Active → Cancelled (coordinates kept)
//! ```
//!
//! # Locking
//!
//! The session table sits behind a Tokio mutex that is never held across a
//! store call.  Each session also carries a writer guard: a submission
//! validates under the table lock, then holds its session's guard from the
//! coordinate write until the step is advanced.  Writes of one session
//! therefore land in the order the submissions took the guard:
//!
//! - cancelled meanwhile: nothing more is written, the submit reports
//!   [`SessionError::SessionAlreadyTerminal`];
//! - a duplicate validated for a step that has since been applied: its
//!   coordinate replaces the earlier one (last write wins) and the step is not
//!   advanced a second time.
//!
//! The last step only commits `Completed` after the profile was marked
//! calibrated.  If that fails the session stays on its last step and the
//! operator can submit it again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use calib_core::{
    CalibrationPlan, CalibrationResult, CalibrationSession, CoordinateConfig, DeviceProfile,
    GuideEntry, SessionError, SessionId, StepOutcome,
};

use crate::infrastructure::storage::{ProfileStore, StoreError};

fn storage_error(e: StoreError) -> SessionError {
    SessionError::Storage(e.to_string())
}

fn terminal(session: &CalibrationSession) -> SessionError {
    SessionError::SessionAlreadyTerminal {
        session_id: session.session_id,
        state: session.state,
    }
}

/// A session in the table plus the guard that orders its submissions.
struct LiveSession {
    record: CalibrationSession,
    writer: Arc<Mutex<()>>,
}

/// Session state machine service.
///
/// Cheap to clone; clones share the session table.
pub struct CalibrationSessions<S> {
    store: Arc<S>,
    plan: Arc<CalibrationPlan>,
    sessions: Arc<Mutex<HashMap<SessionId, LiveSession>>>,
}

impl<S> Clone for CalibrationSessions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            plan: Arc::clone(&self.plan),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S: ProfileStore> CalibrationSessions<S> {
    pub fn new(store: Arc<S>, plan: CalibrationPlan) -> Self {
        Self {
            store,
            plan: Arc::new(plan),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn plan(&self) -> &CalibrationPlan {
        &self.plan
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The operator guide for the injected plan.
    pub fn guide(&self) -> Vec<GuideEntry> {
        self.plan.guide()
    }

    /// Reads a profile, mapping "absent" to [`SessionError::ProfileNotFound`].
    pub async fn profile(&self, profile_id: &str) -> Result<DeviceProfile, SessionError> {
        self.store
            .get_profile(profile_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| SessionError::ProfileNotFound(profile_id.to_string()))
    }

    /// Starts a session for `profile_id` positioned on the first step.
    ///
    /// Recalibrating an already calibrated profile is allowed and starts over
    /// from step 0.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ProfileNotFound`] if the profile does not exist.
    /// - [`SessionError::Storage`] if the store cannot be read.
    pub async fn start(&self, profile_id: &str, operator: &str) -> Result<CalibrationSession, SessionError> {
        let profile = self.profile(profile_id).await?;
        if profile.calibrated {
            info!("profile {profile_id}: recalibrating (previous confidence {:.2})", profile.calibration_confidence);
        }

        let mut session = CalibrationSession::new(Uuid::new_v4(), profile_id, operator, &self.plan, Utc::now());
        session.activate()?;

        info!(
            "session {}: started for profile {profile_id} by {operator}, {} step(s)",
            session.session_id, session.total_steps
        );
        self.sessions.lock().await.insert(
            session.session_id,
            LiveSession {
                record: session.clone(),
                writer: Arc::default(),
            },
        );
        Ok(session)
    }

    /// Returns the current descriptor of a session.
    pub async fn get(&self, session_id: SessionId) -> Result<CalibrationSession, SessionError> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|live| live.record.clone())
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    /// Accepts the operator's coordinate for the current step.
    ///
    /// `frame_ref` names the frame the click was made on and is recorded on
    /// the session.
    ///
    /// # Errors
    ///
    /// In check order: [`SessionError::SessionNotFound`],
    /// [`SessionError::SessionNotStarted`], [`SessionError::SessionAlreadyTerminal`],
    /// [`SessionError::StepMismatch`], [`SessionError::CoordinateOutOfBounds`].
    /// Store failures map to [`SessionError::Storage`]; the step does not
    /// advance.
    pub async fn submit(
        &self,
        result: CalibrationResult,
        frame_ref: Option<String>,
    ) -> Result<CalibrationSession, SessionError> {
        let session_id = result.session_id;

        let (profile_id, writer) = {
            let sessions = self.sessions.lock().await;
            let live = sessions
                .get(&session_id)
                .ok_or(SessionError::SessionNotFound(session_id))?;
            (live.record.profile_id.clone(), Arc::clone(&live.writer))
        };
        let profile = self.profile(&profile_id).await?;

        // ── Validate under the lock ───────────────────────────────────────────
        let (step_index, element_name) = {
            let sessions = self.sessions.lock().await;
            let session = &sessions
                .get(&session_id)
                .ok_or(SessionError::SessionNotFound(session_id))?
                .record;
            if let Err(e) = session.check_submission(&result, profile.resolution) {
                debug!("session {session_id}: submission rejected: {e}");
                return Err(e);
            }
            let name = session
                .current_plan_step(&self.plan)
                .map(|s| s.element_name.clone())
                .unwrap_or_default();
            (session.current_step, name)
        };

        let _turn = writer.lock().await;

        let already_applied = {
            let sessions = self.sessions.lock().await;
            let session = &sessions
                .get(&session_id)
                .ok_or(SessionError::SessionNotFound(session_id))?
                .record;
            if session.is_terminal() {
                info!(
                    "session {session_id}: {:?} before step {} was stored; result discarded",
                    session.state,
                    step_index + 1
                );
                return Err(terminal(session));
            }
            session.current_step != step_index
        };

        // ── Store without the table lock ──────────────────────────────────────
        let coordinate = CoordinateConfig::from_user_click(
            profile_id.as_str(),
            result.element_type,
            element_name,
            result.x,
            result.y,
            result.operator.as_str(),
            result.submitted_at,
        );
        let stored = self
            .store
            .upsert_coordinate(coordinate)
            .await
            .map_err(storage_error)?;
        debug!(
            "session {session_id}: stored {} at ({}, {})",
            stored.element_type, stored.x, stored.y
        );

        if already_applied {
            debug!("session {session_id}: duplicate for step {} replaced the stored value", step_index + 1);
            return self.get(session_id).await;
        }

        // ── Advance ───────────────────────────────────────────────────────────
        let (next, outcome) = {
            let mut sessions = self.sessions.lock().await;
            let live = sessions
                .get_mut(&session_id)
                .ok_or(SessionError::SessionNotFound(session_id))?;
            if live.record.is_terminal() {
                info!(
                    "session {session_id}: {:?} while storing step {}; result discarded",
                    live.record.state,
                    step_index + 1
                );
                return Err(terminal(&live.record));
            }

            let mut next = live.record.clone();
            if frame_ref.is_some() {
                next.screenshot = frame_ref;
            }
            let outcome = next.advance(&self.plan, stored.confidence)?;
            if matches!(outcome, StepOutcome::Advanced { .. }) {
                live.record = next.clone();
            }
            (next, outcome)
        };

        match outcome {
            StepOutcome::Advanced { current_step } => {
                info!(
                    "session {session_id}: step {}/{} accepted",
                    current_step, next.total_steps
                );
                Ok(next)
            }
            StepOutcome::Completed { mean_confidence } => {
                self.finish_profile(&next, mean_confidence).await?;

                let mut sessions = self.sessions.lock().await;
                let live = sessions
                    .get_mut(&session_id)
                    .ok_or(SessionError::SessionNotFound(session_id))?;
                if live.record.is_terminal() {
                    warn!(
                        "session {session_id}: {:?} while finishing; profile {profile_id} is calibrated",
                        live.record.state
                    );
                    return Err(terminal(&live.record));
                }
                live.record = next.clone();
                Ok(next)
            }
        }
    }

    /// Marks the profile calibrated once every required element holds a
    /// validated coordinate.
    ///
    /// On error nothing is committed; the session stays on its last step.
    async fn finish_profile(&self, session: &CalibrationSession, mean_confidence: f64) -> Result<(), SessionError> {
        let profile_id = session.profile_id.as_str();
        let coordinates = self.store.coordinates(profile_id).await.map_err(storage_error)?;

        let missing: Vec<String> = self
            .plan
            .required_elements()
            .filter(|element| {
                !coordinates
                    .iter()
                    .any(|c| c.element_type == *element && c.validated)
            })
            .map(|element| element.to_string())
            .collect();

        if !missing.is_empty() {
            error!(
                "session {}: required element(s) {} lack a validated coordinate; staying on the last step",
                session.session_id,
                missing.join(", ")
            );
            return Err(SessionError::Storage(format!(
                "missing validated coordinates: {}",
                missing.join(", ")
            )));
        }

        if let Err(e) = self.store.set_calibrated(profile_id, mean_confidence).await {
            error!(
                "session {}: could not mark profile {profile_id} calibrated: {e}; staying on the last step",
                session.session_id
            );
            return Err(storage_error(e));
        }
        info!(
            "session {}: calibration complete, profile {profile_id} calibrated (confidence {mean_confidence:.2})",
            session.session_id
        );
        Ok(())
    }

    /// Cancels a session.  Coordinates accepted so far stay stored.
    ///
    /// Idempotent on a terminal session and a no-op for an unknown id.
    pub async fn cancel(&self, session_id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&session_id).map(|live| &mut live.record) {
            Some(session) => {
                if session.cancel() {
                    info!(
                        "session {session_id}: cancelled at step {}/{}",
                        session.current_step + 1,
                        session.total_steps
                    );
                } else {
                    debug!("session {session_id}: cancel ignored, already {:?}", session.state);
                }
            }
            None => warn!("session {session_id}: cancel for unknown session ignored"),
        }
    }

    /// Drops every terminal session from the table.
    pub async fn prune_terminal(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, live| !live.record.is_terminal());
        before - sessions.len()
    }

    /// Stores unvalidated default coordinates for a profile that has none.
    ///
    /// Returns the number of coordinates written (zero if the profile already
    /// had some).
    pub async fn seed_default_coordinates(&self, profile_id: &str) -> Result<usize, SessionError> {
        let profile = self.profile(profile_id).await?;
        let existing = self.store.coordinates(profile_id).await.map_err(storage_error)?;
        if !existing.is_empty() {
            return Ok(0);
        }

        let defaults = self
            .plan
            .default_coordinates(profile_id, profile.resolution, Utc::now());
        let count = defaults.len();
        for coordinate in defaults {
            self.store
                .upsert_coordinate(coordinate)
                .await
                .map_err(storage_error)?;
        }
        info!("profile {profile_id}: seeded {count} default coordinate(s)");
        Ok(count)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
