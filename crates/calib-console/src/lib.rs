//! calib-console library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Architecture
//!
//! ```text
//! main()  (line-oriented operator console)
//!  └─ SessionOrchestrator           application::orchestrate_session
//!       ├─ CalibrationSessions      application::run_calibration
//!       │    └─ ProfileStore        infrastructure::storage
//!       ├─ StreamChannel            infrastructure::stream_channel
//!       └─ SessionJournal           infrastructure::journal
//! ```

pub mod application;
pub mod infrastructure;
