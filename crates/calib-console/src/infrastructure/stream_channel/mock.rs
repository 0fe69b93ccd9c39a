//! Scripted [`StreamChannel`] for tests.
//!
//! `open` either fails with a queued error or succeeds with a subscription
//! whose event sender and frame slot the test keeps, so the test decides
//! exactly which frames, errors and losses the orchestrator sees.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{
    ChannelError, ChannelEvent, ChannelState, ControlCommand, FrameSlot, StateCell, StreamChannel,
    StreamFrame, StreamHandle, StreamSubscription,
};

/// The test's end of one opened stream.
#[derive(Debug)]
pub struct RemoteEnd {
    pub device_id: String,
    pub events: mpsc::Sender<ChannelEvent>,
    pub frames: FrameSlot,
    pub control: mpsc::Receiver<ControlCommand>,
    pub state: StateCell,
}

impl RemoteEnd {
    /// Publishes `frame` as the newest, replacing any unread one.
    pub fn push_frame(&self, frame: StreamFrame) {
        self.frames.send_replace(Some(frame));
    }

    /// Simulates the transport dropping: marks the stream failed and
    /// delivers `ConnectionLost`.
    pub async fn lose_connection(&self, reason: &str) {
        if self.state.transition(ChannelState::Failed) {
            let _ = self
                .events
                .send(ChannelEvent::ConnectionLost {
                    reason: reason.to_string(),
                })
                .await;
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<ChannelError>,
    opened: Vec<RemoteEnd>,
}

/// A [`StreamChannel`] driven entirely by the test.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: Mutex<Script>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail with `error`.  Calls queue up.
    pub fn fail_next_open(&self, error: ChannelError) {
        self.lock().failures.push_back(error);
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.lock().opened.len()
    }

    /// Takes the remote end of the most recently opened stream.
    pub fn take_last(&self) -> Option<RemoteEnd> {
        self.lock().opened.pop()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StreamChannel for ScriptedChannel {
    async fn open(&self, device_id: &str) -> Result<StreamSubscription, ChannelError> {
        let mut script = self.lock();
        if let Some(error) = script.failures.pop_front() {
            return Err(error);
        }

        let state = StateCell::new();
        state.transition(ChannelState::Connecting);
        state.transition(ChannelState::Open);
        let (event_tx, events) = mpsc::channel(16);
        let (frame_tx, frames) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(4);

        script.opened.push(RemoteEnd {
            device_id: device_id.to_string(),
            events: event_tx,
            frames: frame_tx,
            control: control_rx,
            state: state.clone(),
        });

        Ok(StreamSubscription::new(
            StreamHandle::new(device_id, state, control_tx),
            events,
            frames,
        ))
    }
}
