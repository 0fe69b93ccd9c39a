//! Domain entities for screen calibration.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! - [`transform`] converts a pointer position on a rendered screenshot into
//!   device pixels.  It is a pure function: same inputs, same output, no I/O.
//! - [`element`] enumerates the UI controls that can be calibrated.
//! - [`profile`] describes a screen configuration and the coordinates that
//!   have been recorded for it.
//! - [`plan`] is the ordered list of steps an operator walks through.
//! - [`session`] is the transient record of one calibration run, plus the
//!   rules for moving it from step to step.
//!
//! Code in outer layers (the agent and console crates) depends on the domain,
//! but the domain never depends on them.

/// Rendered-surface to device-pixel coordinate transform.
pub mod transform;

/// UI element types and calibration methods.
pub mod element;

/// Device profiles and calibrated coordinates.
pub mod profile;

/// The ordered calibration plan.
pub mod plan;

/// Calibration session record and step transitions.
pub mod session;
