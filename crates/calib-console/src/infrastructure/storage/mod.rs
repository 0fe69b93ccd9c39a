//! Storage infrastructure: profile persistence and configuration files.
//!
//! - **`ProfileStore`** (this file) – the seam the session service depends
//!   on.  Reads profiles, writes coordinates, and flips the `calibrated` flag.
//! - **`memory`** – [`InMemoryProfileStore`], the console's store, optionally
//!   loaded from and saved to a TOML profiles file.
//! - **`config`** – the console's own TOML configuration.

pub mod config;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemoryProfileStore;

use async_trait::async_trait;
use thiserror::Error;

use calib_core::{CoordinateConfig, DeviceProfile, ProfileError};

/// Errors returned by a [`ProfileStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// The store refused to persist a coordinate outside the device screen.
    #[error("coordinate ({x}, {y}) is outside the screen of profile {profile_id}")]
    OutOfBounds { profile_id: String, x: u32, y: u32 },

    #[error("invalid profile record: {0}")]
    InvalidRecord(#[from] ProfileError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence seam for device profiles and their calibrated coordinates.
///
/// Coordinates are keyed by `(profile_id, element_type)`; writing the same key
/// twice replaces the earlier record (last write wins).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns the profile, or `None` if it does not exist.
    async fn get_profile(&self, profile_id: &str) -> Result<Option<DeviceProfile>, StoreError>;

    /// Inserts or replaces the coordinate for its `(profile_id, element_type)`
    /// and returns the stored record.
    async fn upsert_coordinate(&self, coordinate: CoordinateConfig) -> Result<CoordinateConfig, StoreError>;

    /// Marks the profile calibrated with the given aggregate confidence.
    async fn set_calibrated(&self, profile_id: &str, confidence: f64) -> Result<DeviceProfile, StoreError>;

    /// All coordinates of a profile, ordered by element type.
    async fn coordinates(&self, profile_id: &str) -> Result<Vec<CoordinateConfig>, StoreError>;
}
