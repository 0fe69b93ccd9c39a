//! # calib-core
//!
//! Shared library for the screen calibration system: the coordinate transform,
//! the calibration plan, device profile and coordinate records, the session
//! record and its transitions, and the JSON streaming wire protocol.
//!
//! This crate is used by both the device-side agent and the operator console.
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! An operator teaches an automation agent where UI elements sit on a phone's
//! screen.  The phone's display is streamed to the operator's console as a
//! series of screenshots; the operator clicks on the (usually scaled-down)
//! rendered screenshot, and each click is converted into real device pixels
//! and stored against one step of a calibration plan.
//!
//! - **`domain`** – Pure business logic.  The most important pieces are the
//!   [`surface_to_device`] transform (click on a scaled image → device pixel)
//!   and the [`CalibrationSession`] record with its step transitions.
//!
//! - **`protocol`** – How frames and control messages travel over the
//!   WebSocket: one JSON object per text frame, discriminated by a `type`
//!   field.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `calib_core::CalibrationPlan` instead of `calib_core::domain::plan::CalibrationPlan`.
pub use domain::element::{CalibrationMethod, ElementType};
pub use domain::plan::{CalibrationPlan, GuideEntry, PlanError, PlanStep};
pub use domain::profile::{CoordinateConfig, DeviceProfile, ProfileError, Resolution};
pub use domain::session::{
    CalibrationResult, CalibrationSession, SessionError, SessionId, SessionState, StepOutcome,
};
pub use domain::transform::{
    surface_to_device, DevicePoint, PointerPosition, SurfaceGeometry, TransformError,
};
pub use protocol::codec::{decode_client_message, decode_server_message, encode, ProtocolError};
pub use protocol::messages::{ClientMessage, ServerMessage};
