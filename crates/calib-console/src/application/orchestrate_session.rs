//! Use case: orchestrate one calibration session end to end.
//!
//! [`SessionOrchestrator`] is the single writer of the console's live state:
//! the active session, its stream subscription, the last received frame and
//! the connectivity indicator.  The console loop drives it with three kinds
//! of input, processed in arrival order:
//!
//! ```text
//! next_event()          frame / agent error / connection loss from the stream
//! submit_coordinate()   operator click on the rendered frame
//! cancel_session()      operator cancel
//! ```
//!
//! # Click path
//!
//! ```text
//! pointer on surface ──surface_to_device(last frame size)──► device pixel
//!                    ──CalibrationSessions::submit──► stored, step advanced
//! ```
//!
//! A lost connection does not cancel the session: the last frame stays
//! cached and clicks keep working until the operator reconnects or finishes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use calib_core::{
    surface_to_device, CalibrationResult, CalibrationSession, PointerPosition, SessionError,
    SessionId, SurfaceGeometry, TransformError,
};

use crate::application::run_calibration::CalibrationSessions;
use crate::infrastructure::journal::{JournalError, JournalRoot, SessionJournal};
use crate::infrastructure::storage::ProfileStore;
use crate::infrastructure::stream_channel::{
    ChannelError, ChannelEvent, StreamChannel, StreamFrame, StreamSubscription,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The profile has no device id to stream from.  No session was started.
    #[error("profile {0} has no device bound")]
    NoDeviceBound(String),

    #[error("no calibration session is active")]
    NoActiveSession,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Stream connectivity as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connectivity::Connecting => "connecting",
            Connectivity::Connected => "connected",
            Connectivity::Disconnected => "disconnected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// The stream could not be opened.
    Connection,
    /// The agent reported a failure.
    Remote,
}

/// Events delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected { device_id: String },
    Frame(StreamFrame),
    Error { kind: FeedErrorKind, message: String },
    Disconnected { reason: String },
}

struct ActiveSession {
    session_id: SessionId,
    device_id: String,
    total_steps: usize,
    stream: Option<StreamSubscription>,
    connectivity: Connectivity,
    last_frame: Option<StreamFrame>,
    journal: Option<SessionJournal>,
}

impl ActiveSession {
    fn note(&mut self, write: impl FnOnce(&mut SessionJournal) -> Result<(), JournalError>) {
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = write(journal) {
                warn!("session {}: journal write failed: {e}", self.session_id);
            }
        }
    }
}

/// Drives one session at a time over a stream channel and a profile store.
pub struct SessionOrchestrator<S, C> {
    sessions: CalibrationSessions<S>,
    channel: Arc<C>,
    journal_root: Option<JournalRoot>,
    active: Option<ActiveSession>,
    pending: VecDeque<FeedEvent>,
}

impl<S: ProfileStore, C: StreamChannel> SessionOrchestrator<S, C> {
    pub fn new(sessions: CalibrationSessions<S>, channel: Arc<C>) -> Self {
        Self {
            sessions,
            channel,
            journal_root: None,
            active: None,
            pending: VecDeque::new(),
        }
    }

    /// Enables the per-session journal under `root`.
    pub fn with_journal(mut self, root: JournalRoot) -> Self {
        self.journal_root = Some(root);
        self
    }

    pub fn sessions(&self) -> &CalibrationSessions<S> {
        &self.sessions
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session_id)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.active
            .as_ref()
            .map_or(Connectivity::Disconnected, |a| a.connectivity)
    }

    pub fn last_frame(&self) -> Option<&StreamFrame> {
        self.active.as_ref().and_then(|a| a.last_frame.as_ref())
    }

    /// Whether [`next_event`](Self::next_event) has anything to wait on.
    pub fn has_feed(&self) -> bool {
        !self.pending.is_empty() || self.active.as_ref().is_some_and(|a| a.stream.is_some())
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Starts a session for `profile_id` and opens the stream of its first
    /// device.  A session already running on this console is cancelled first.
    ///
    /// A stream that cannot be opened does not fail the start: the session is
    /// active, connectivity is `Disconnected`, and the failure is queued as a
    /// [`FeedEvent::Error`].
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::NoDeviceBound`] if the profile maps no device.
    /// - [`SessionError::ProfileNotFound`] via [`OrchestratorError::Session`].
    pub async fn start_session(
        &mut self,
        profile_id: &str,
        operator: &str,
    ) -> Result<CalibrationSession, OrchestratorError> {
        let profile = self.sessions.profile(profile_id).await?;
        let device_id = profile
            .primary_device()
            .ok_or_else(|| OrchestratorError::NoDeviceBound(profile_id.to_string()))?
            .to_string();

        if let Some(previous) = self.active.as_ref().map(|a| a.session_id) {
            info!("session {previous}: replaced by a new session");
            self.sessions.cancel(previous).await;
            self.finish_active(false).await;
        }
        self.sessions.prune_terminal().await;

        let session = self.sessions.start(profile_id, operator).await?;

        let journal = self.journal_root.as_ref().and_then(|root| {
            root.begin(session.session_id, session.created_at)
                .map_err(|e| warn!("session {}: journal disabled: {e}", session.session_id))
                .ok()
        });
        self.active = Some(ActiveSession {
            session_id: session.session_id,
            device_id,
            total_steps: session.total_steps,
            stream: None,
            connectivity: Connectivity::Connecting,
            last_frame: None,
            journal,
        });
        self.open_stream().await;

        Ok(session)
    }

    /// Maps a pointer position on the rendered frame to device pixels and
    /// submits it for the current step.
    ///
    /// `render_width` and `render_height` are the size the last frame is
    /// drawn at.
    ///
    /// # Errors
    ///
    /// - [`TransformError::InvalidSurfaceState`] if no frame was received yet
    ///   or the render size is unusable.
    /// - [`SessionError::SessionAlreadyTerminal`] if `session_id` is not this
    ///   console's active session (a late click is discarded).
    /// - Any validation error of [`CalibrationSessions::submit`].
    pub async fn submit_coordinate(
        &mut self,
        session_id: SessionId,
        pointer: PointerPosition,
        render_width: f64,
        render_height: f64,
    ) -> Result<CalibrationSession, OrchestratorError> {
        if self.active_session_id() != Some(session_id) {
            return Err(self.stale_session(session_id).await);
        }
        let active = self.active.as_ref().ok_or(OrchestratorError::NoActiveSession)?;

        let frame = active
            .last_frame
            .clone()
            .ok_or(TransformError::InvalidSurfaceState {
                reason: "no frame has been received yet",
            })?;
        let geometry = SurfaceGeometry::new(render_width, render_height, frame.width, frame.height);
        let point = surface_to_device(&geometry, pointer)?;

        let current = self.sessions.get(session_id).await?;
        let element_type = current
            .element_type
            .ok_or(SessionError::SessionAlreadyTerminal {
                session_id,
                state: current.state,
            })?;
        debug!(
            "session {session_id}: click ({:.1}, {:.1}) on {render_width}x{render_height} -> ({}, {}) on {}x{}",
            pointer.client_x, pointer.client_y, point.x, point.y, frame.width, frame.height
        );

        let result = CalibrationResult {
            session_id,
            element_type,
            x: point.x,
            y: point.y,
            operator: current.operator.clone(),
            submitted_at: Utc::now(),
        };
        let frame_ref = format!("{}@{}", frame.device_id, frame.timestamp.to_rfc3339());

        let outcome = self.sessions.submit(result, Some(frame_ref)).await;

        if self.active_session_id() != Some(session_id) {
            debug!("session {session_id}: no longer active, submission result discarded");
            return Err(self.stale_session(session_id).await);
        }
        let active = self.active.as_mut().ok_or(OrchestratorError::NoActiveSession)?;

        match outcome {
            Ok(session) => {
                active.note(|j| {
                    j.log_click(current.current_step + 1, element_type, &current.element_name, point, Some(&frame))
                        .map(|_| ())
                });
                if session.completed {
                    self.finish_active(true).await;
                }
                Ok(session)
            }
            Err(e) => {
                let message = e.to_string();
                active.note(|j| j.log_error("submission", &message));
                // A failed last step leaves the session active and the stream
                // open; only a session that ended elsewhere is released.
                let ended = match self.sessions.get(session_id).await {
                    Ok(session) => session.is_terminal(),
                    Err(_) => true,
                };
                if ended {
                    self.finish_active(false).await;
                }
                Err(e.into())
            }
        }
    }

    /// Cancels a session and closes its stream.
    ///
    /// Idempotent; an unknown id is a logged no-op.
    pub async fn cancel_session(&mut self, session_id: SessionId) {
        self.sessions.cancel(session_id).await;
        if self.active_session_id() == Some(session_id) {
            self.finish_active(false).await;
        }
    }

    /// Reopens the stream for the active session.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NoActiveSession`] when nothing is running.
    /// A failed reopen is reported through the feed, like in
    /// [`start_session`](Self::start_session).
    pub async fn reconnect(&mut self) -> Result<(), OrchestratorError> {
        let active = self.active.as_mut().ok_or(OrchestratorError::NoActiveSession)?;
        if let Some(old) = active.stream.take() {
            if let Err(e) = old.handle.close() {
                debug!("session {}: closing old stream: {e}", active.session_id);
            }
        }
        info!("session {}: reconnecting to {}", active.session_id, active.device_id);
        self.open_stream().await;
        Ok(())
    }

    /// Waits for the next feed event.
    ///
    /// Returns `None` when there is no stream and nothing queued; see
    /// [`has_feed`](Self::has_feed).
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let active = self.active.as_mut()?;
        let stream = active.stream.as_mut()?;
        let received = stream.next().await;

        match received {
            Some(ChannelEvent::Frame(frame)) => {
                active.connectivity = Connectivity::Connected;
                active.last_frame = Some(frame.clone());
                Some(FeedEvent::Frame(frame))
            }
            Some(ChannelEvent::Connected { device_id, message }) => {
                active.connectivity = Connectivity::Connected;
                active.note(|j| j.log_websocket("connected", &message));
                Some(FeedEvent::Connected { device_id })
            }
            Some(ChannelEvent::RemoteError { message }) => {
                active.note(|j| j.log_error("remote_error", &message));
                Some(FeedEvent::Error {
                    kind: FeedErrorKind::Remote,
                    message,
                })
            }
            Some(ChannelEvent::ConnectionLost { reason }) => Some(Self::lose_stream(active, reason)),
            None => Some(Self::lose_stream(active, "stream ended".to_string())),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn open_stream(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.connectivity = Connectivity::Connecting;

        match self.channel.open(&active.device_id).await {
            Ok(subscription) => {
                active.stream = Some(subscription);
                active.connectivity = Connectivity::Connected;
                let device = active.device_id.clone();
                active.note(|j| j.log_websocket("open", &device));
            }
            Err(e) => {
                warn!("session {}: stream unavailable: {e}", active.session_id);
                active.connectivity = Connectivity::Disconnected;
                let message = e.to_string();
                active.note(|j| j.log_error("connection_error", &message));
                self.pending.push_back(FeedEvent::Error {
                    kind: FeedErrorKind::Connection,
                    message,
                });
            }
        }
    }

    /// Releases the stream after a loss; the session itself stays active.
    ///
    /// A frame that arrived but was never yielded still becomes the cached
    /// frame, so clicks after the loss map against the newest picture.
    fn lose_stream(active: &mut ActiveSession, reason: String) -> FeedEvent {
        warn!("session {}: stream lost: {reason}", active.session_id);
        if let Some(frame) = active.stream.take().and_then(|mut stream| stream.take_frame()) {
            active.last_frame = Some(frame);
        }
        active.connectivity = Connectivity::Disconnected;
        active.note(|j| j.log_websocket("disconnected", &reason));
        FeedEvent::Disconnected { reason }
    }

    /// Closes the stream and the journal of the active session.
    async fn finish_active(&mut self, success: bool) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Some(stream) = active.stream.take() {
            if let Err(e) = stream.handle.close() {
                warn!("session {}: {e}", active.session_id);
            }
        }
        self.pending.clear();

        if let Some(journal) = active.journal.take() {
            let completed_steps = match self.sessions.get(active.session_id).await {
                Ok(s) => s.current_step.min(s.total_steps),
                Err(_) => 0,
            };
            if let Err(e) = journal.finalize(success, active.total_steps, completed_steps) {
                warn!("session {}: journal summary failed: {e}", active.session_id);
            }
        }
        debug!("session {}: released", active.session_id);
    }

    /// The error for a session this console is not running.
    async fn stale_session(&self, session_id: SessionId) -> OrchestratorError {
        match self.sessions.get(session_id).await {
            Ok(session) => SessionError::SessionAlreadyTerminal {
                session_id,
                state: session.state,
            }
            .into(),
            Err(e) => e.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use calib_core::{CalibrationPlan, DeviceProfile, ElementType, PlanStep, Resolution, SessionState};

    use crate::infrastructure::storage::testing::FaultyStore;
    use crate::infrastructure::storage::InMemoryProfileStore;
    use crate::infrastructure::stream_channel::mock::{RemoteEnd, ScriptedChannel};
    use crate::infrastructure::stream_channel::{ChannelState, ControlCommand};

    type TestOrchestrator = SessionOrchestrator<InMemoryProfileStore, ScriptedChannel>;

    fn profile(id: &str, device: Option<&str>) -> DeviceProfile {
        let mut p = DeviceProfile::new(id, Resolution::new(1080, 2400), 420, Utc::now());
        if let Some(d) = device {
            p.add_device_id(d, Utc::now());
        }
        p
    }

    fn plan(len: usize) -> CalibrationPlan {
        let steps = ElementType::ALL
            .iter()
            .take(len)
            .map(|&element_type| PlanStep {
                element_type,
                element_name: element_type.to_string(),
                instructions: format!("Click {element_type}"),
                help_text: String::new(),
                required: true,
                default_position: (0.5, 0.5),
            })
            .collect();
        CalibrationPlan::new(steps).unwrap()
    }

    fn orchestrator(steps: usize) -> (TestOrchestrator, Arc<ScriptedChannel>) {
        let store = Arc::new(InMemoryProfileStore::with_profiles([
            profile("p1", Some("R58M123")),
            profile("bare", None),
        ]));
        let channel = Arc::new(ScriptedChannel::new());
        let sessions = CalibrationSessions::new(store, plan(steps));
        (SessionOrchestrator::new(sessions, Arc::clone(&channel)), channel)
    }

    fn frame() -> StreamFrame {
        StreamFrame {
            device_id: "R58M123".to_string(),
            image: b"frame".to_vec(),
            format: "png",
            width: 1080,
            height: 2400,
            timestamp: Utc::now(),
        }
    }

    async fn deliver_frame(orch: &mut TestOrchestrator, remote: &RemoteEnd) {
        remote.push_frame(frame());
        assert!(matches!(orch.next_event().await, Some(FeedEvent::Frame(_))));
    }

    // ── start_session ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_opens_stream_on_first_device() {
        // Arrange
        let (mut orch, channel) = orchestrator(3);

        // Act
        let session = orch.start_session("p1", "admin").await.unwrap();

        // Assert
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(orch.active_session_id(), Some(session.session_id));
        assert_eq!(orch.connectivity(), Connectivity::Connected);
        assert_eq!(channel.take_last().unwrap().device_id, "R58M123");
    }

    #[tokio::test]
    async fn test_start_without_device_is_no_device_bound() {
        let (mut orch, channel) = orchestrator(3);

        let result = orch.start_session("bare", "admin").await;

        assert!(matches!(result, Err(OrchestratorError::NoDeviceBound(id)) if id == "bare"));
        assert_eq!(orch.active_session_id(), None);
        assert_eq!(channel.open_count(), 0);
    }

    #[tokio::test]
    async fn test_start_for_unknown_profile_is_profile_not_found() {
        let (mut orch, _channel) = orchestrator(3);
        assert!(matches!(
            orch.start_session("ghost", "admin").await,
            Err(OrchestratorError::Session(SessionError::ProfileNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_open_failure_keeps_session_active_and_reports_feed_error() {
        // Arrange
        let (mut orch, channel) = orchestrator(3);
        channel.fail_next_open(ChannelError::ConnectionError {
            device_id: "R58M123".to_string(),
            reason: "no handshake".to_string(),
        });

        // Act
        let session = orch.start_session("p1", "admin").await.unwrap();

        // Assert
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(orch.connectivity(), Connectivity::Disconnected);
        assert!(matches!(
            orch.next_event().await,
            Some(FeedEvent::Error { kind: FeedErrorKind::Connection, .. })
        ));
        assert!(!orch.has_feed());
        assert!(orch.last_frame().is_none());
    }

    #[tokio::test]
    async fn test_second_start_cancels_first_session() {
        let (mut orch, channel) = orchestrator(3);
        let first = orch.start_session("p1", "admin").await.unwrap();
        let first_remote = channel.take_last().unwrap();

        let second = orch.start_session("p1", "admin").await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first_remote.state.get(), ChannelState::Closed);
        assert!(orch.sessions().get(first.session_id).await.is_err(), "pruned");
    }

    // ── submit_coordinate ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_submit_before_any_frame_is_invalid_surface_state() {
        let (mut orch, _channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();

        let result = orch
            .submit_coordinate(session.session_id, PointerPosition::new(10.0, 10.0), 360.0, 800.0)
            .await;

        assert!(matches!(
            result,
            Err(OrchestratorError::Transform(TransformError::InvalidSurfaceState { .. }))
        ));
    }

    #[tokio::test]
    async fn test_submit_maps_click_to_device_pixels() {
        // Arrange
        let (mut orch, channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;

        // Act
        let updated = orch
            .submit_coordinate(session.session_id, PointerPosition::new(180.0, 400.0), 360.0, 800.0)
            .await
            .unwrap();

        // Assert
        assert_eq!(updated.current_step, 1);
        let coords = orch.sessions().store().coordinates("p1").await.unwrap();
        assert_eq!((coords[0].x, coords[0].y), (540, 1200));
        assert!(updated.screenshot.unwrap().starts_with("R58M123@"));
    }

    #[tokio::test]
    async fn test_zero_render_size_is_invalid_surface_state() {
        let (mut orch, channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;

        let result = orch
            .submit_coordinate(session.session_id, PointerPosition::new(1.0, 1.0), 0.0, 800.0)
            .await;

        assert!(matches!(result, Err(OrchestratorError::Transform(_))));
        assert_eq!(orch.sessions().get(session.session_id).await.unwrap().current_step, 0);
    }

    #[tokio::test]
    async fn test_completion_closes_stream() {
        // Arrange
        let (mut orch, channel) = orchestrator(2);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let mut remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;

        // Act
        for _ in 0..2 {
            orch.submit_coordinate(session.session_id, PointerPosition::new(5.0, 5.0), 360.0, 800.0)
                .await
                .unwrap();
        }

        // Assert
        assert_eq!(remote.state.get(), ChannelState::Closed);
        assert_eq!(remote.control.try_recv(), Ok(ControlCommand::Stop));
        assert_eq!(orch.active_session_id(), None);
        let profile = orch.sessions().store().get_profile("p1").await.unwrap().unwrap();
        assert!(profile.calibrated);
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_stream_open_until_retry() {
        // Arrange: one-step plan, marking the profile calibrated fails once
        let store = FaultyStore::new(InMemoryProfileStore::with_profiles([profile("p1", Some("R58M123"))]))
            .fail_calibrations(1);
        let channel = Arc::new(ScriptedChannel::new());
        let sessions = CalibrationSessions::new(Arc::new(store), plan(1));
        let mut orch = SessionOrchestrator::new(sessions, Arc::clone(&channel));
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        remote.push_frame(frame());
        assert!(matches!(orch.next_event().await, Some(FeedEvent::Frame(_))));

        // Act
        let failed = orch
            .submit_coordinate(session.session_id, PointerPosition::new(5.0, 5.0), 360.0, 800.0)
            .await;

        // Assert: still running, stream still open
        assert!(matches!(failed, Err(OrchestratorError::Session(SessionError::Storage(_)))));
        assert_eq!(orch.active_session_id(), Some(session.session_id));
        assert_eq!(remote.state.get(), ChannelState::Open);

        // Act: retry the same step
        let done = orch
            .submit_coordinate(session.session_id, PointerPosition::new(5.0, 5.0), 360.0, 800.0)
            .await
            .unwrap();

        // Assert
        assert_eq!(done.state, SessionState::Completed);
        assert_eq!(remote.state.get(), ChannelState::Closed);
        assert_eq!(orch.active_session_id(), None);
        assert!(orch.sessions().store().get_profile("p1").await.unwrap().unwrap().calibrated);
    }

    #[tokio::test]
    async fn test_submit_after_completion_is_discarded() {
        let (mut orch, channel) = orchestrator(1);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;
        orch.submit_coordinate(session.session_id, PointerPosition::new(5.0, 5.0), 360.0, 800.0)
            .await
            .unwrap();

        let late = orch
            .submit_coordinate(session.session_id, PointerPosition::new(5.0, 5.0), 360.0, 800.0)
            .await;

        assert!(matches!(
            late,
            Err(OrchestratorError::Session(SessionError::SessionAlreadyTerminal {
                state: SessionState::Completed,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_connection_lost_then_submit_uses_cached_frame() {
        // Arrange
        let (mut orch, channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;

        // Act: the transport drops
        remote.lose_connection("reset by peer").await;
        let event = orch.next_event().await;

        // Assert: disconnected, not cancelled
        assert_eq!(
            event,
            Some(FeedEvent::Disconnected {
                reason: "reset by peer".to_string()
            })
        );
        assert_eq!(orch.connectivity(), Connectivity::Disconnected);
        assert!(!orch.has_feed());

        // Act: a click still works against the last frame
        let updated = orch
            .submit_coordinate(session.session_id, PointerPosition::new(180.0, 400.0), 360.0, 800.0)
            .await
            .unwrap();

        // Assert
        assert_eq!(updated.state, SessionState::Active);
        assert_eq!(updated.current_step, 1);
        assert_eq!(orch.connectivity(), Connectivity::Disconnected);
    }

    #[tokio::test]
    async fn test_unread_frame_before_loss_becomes_cached_frame() {
        // Arrange: a frame is published and the link drops before it is read
        let (mut orch, channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        remote.push_frame(frame());
        remote.lose_connection("reset by peer").await;

        // Act
        let event = orch.next_event().await;

        // Assert: the loss is reported first, and the frame is not thrown away
        assert!(matches!(event, Some(FeedEvent::Disconnected { .. })));
        assert_eq!(orch.last_frame().map(|f| f.width), Some(frame().width));
        let updated = orch
            .submit_coordinate(session.session_id, PointerPosition::new(180.0, 400.0), 360.0, 800.0)
            .await
            .unwrap();
        assert_eq!(updated.current_step, 1);
    }

    #[tokio::test]
    async fn test_remote_error_is_reported_without_disconnecting() {
        let (mut orch, channel) = orchestrator(3);
        orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();

        remote
            .events
            .send(ChannelEvent::RemoteError {
                message: "Screen capture failed: no frame".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            orch.next_event().await,
            Some(FeedEvent::Error { kind: FeedErrorKind::Remote, .. })
        ));
        assert_eq!(orch.connectivity(), Connectivity::Connected);
    }

    // ── cancel_session / reconnect ────────────────────────────────────────────

    #[tokio::test]
    async fn test_cancel_closes_stream_and_keeps_coordinates() {
        // Arrange
        let (mut orch, channel) = orchestrator(3);
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;
        orch.submit_coordinate(session.session_id, PointerPosition::new(1.0, 1.0), 360.0, 800.0)
            .await
            .unwrap();

        // Act
        orch.cancel_session(session.session_id).await;
        orch.cancel_session(session.session_id).await;

        // Assert
        assert_eq!(remote.state.get(), ChannelState::Closed);
        assert_eq!(orch.active_session_id(), None);
        assert_eq!(
            orch.sessions().get(session.session_id).await.unwrap().state,
            SessionState::Cancelled
        );
        assert_eq!(orch.sessions().store().coordinates("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_opens_a_new_stream() {
        let (mut orch, channel) = orchestrator(3);
        orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        remote.lose_connection("gone").await;
        orch.next_event().await;

        orch.reconnect().await.unwrap();

        assert_eq!(channel.open_count(), 1, "new stream recorded after take_last");
        assert_eq!(orch.connectivity(), Connectivity::Connected);
        assert!(orch.has_feed());
    }

    #[tokio::test]
    async fn test_reconnect_without_session_fails() {
        let (mut orch, _channel) = orchestrator(3);
        assert!(matches!(orch.reconnect().await, Err(OrchestratorError::NoActiveSession)));
    }

    // ── journal ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_journal_records_clicks_and_summary() {
        // Arrange
        let root = std::env::temp_dir().join(format!("calib-orch-journal-{}", uuid::Uuid::new_v4()));
        let (orch, channel) = orchestrator(1);
        let mut orch = orch.with_journal(JournalRoot::new(&root));
        let session = orch.start_session("p1", "admin").await.unwrap();
        let remote = channel.take_last().unwrap();
        deliver_frame(&mut orch, &remote).await;

        // Act
        orch.submit_coordinate(session.session_id, PointerPosition::new(1.0, 1.0), 360.0, 800.0)
            .await
            .unwrap();

        // Assert
        let dirs: Vec<_> = std::fs::read_dir(&root).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(dirs.len(), 1);
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dirs[0].join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["completed_steps"], 1);
        assert_eq!(summary["screenshots_saved"], 1);
        let events = std::fs::read_to_string(dirs[0].join("logs").join("events.jsonl")).unwrap();
        let click: serde_json::Value = events
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
            .find(|v| v["event_type"] == "click")
            .unwrap();
        assert_eq!(click["data"]["step"], 1);
        let _ = std::fs::remove_dir_all(root);
    }
}
