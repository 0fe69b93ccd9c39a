//! Application layer use cases for the operator console.
//!
//! Use cases in this layer:
//!
//! - **Depend on abstractions** ([`ProfileStore`], [`StreamChannel`]) rather
//!   than concrete implementations, so tests can inject doubles.
//! - **Contain no socket or file-system code** of their own.
//!
//! # Sub-modules
//!
//! - **`run_calibration`** – The session state machine service: starts
//!   sessions, validates and stores each submitted coordinate, advances the
//!   plan, and marks the profile calibrated at the end.
//!
//! - **`orchestrate_session`** – Glue between the streaming channel, the
//!   coordinate transform and the session service.  Owns the last received
//!   frame and the connectivity indicator.
//!
//! [`ProfileStore`]: crate::infrastructure::storage::ProfileStore
//! [`StreamChannel`]: crate::infrastructure::stream_channel::StreamChannel

pub mod orchestrate_session;
pub mod run_calibration;
