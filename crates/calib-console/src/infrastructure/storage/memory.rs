//! In-memory [`ProfileStore`] with optional TOML file persistence.
//!
//! The whole store is one `RwLock`-protected map pair.  The profiles file
//! mirrors it as two arrays of tables:
//!
//! ```toml
//! [[profiles]]
//! profile_id = "samsung_sm-g960n_1080x2220"
//! resolution = { width = 1080, height = 2220 }
//! dpi = 420
//! device_ids = ["R58M123"]
//! # ...
//!
//! [[coordinates]]
//! profile_id = "samsung_sm-g960n_1080x2220"
//! element_type = "title_field"
//! x = 540
//! y = 400
//! # ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use calib_core::{CoordinateConfig, DeviceProfile, ElementType};

use super::config::{write_toml, ConfigError};
use super::{ProfileStore, StoreError};

type CoordinateKey = (String, ElementType);

#[derive(Debug, Default)]
struct StoreState {
    profiles: BTreeMap<String, DeviceProfile>,
    coordinates: BTreeMap<CoordinateKey, CoordinateConfig>,
}

/// On-disk layout of the profiles file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<DeviceProfile>,
    #[serde(default)]
    coordinates: Vec<CoordinateConfig>,
}

/// Profile store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    state: RwLock<StoreState>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `profiles`.
    pub fn with_profiles(profiles: impl IntoIterator<Item = DeviceProfile>) -> Self {
        let state = StoreState {
            profiles: profiles
                .into_iter()
                .map(|p| (p.profile_id.clone(), p))
                .collect(),
            coordinates: BTreeMap::new(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Inserts or replaces a profile.
    pub async fn insert_profile(&self, profile: DeviceProfile) {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.profile_id.clone(), profile);
    }

    /// Ids of all stored profiles, sorted.
    pub async fn profile_ids(&self) -> Vec<String> {
        self.state.read().await.profiles.keys().cloned().collect()
    }

    /// Loads the store from a profiles file.  A missing file yields an empty
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for read failures other than "not found"
    /// and [`ConfigError::Parse`] for malformed TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let file: ProfilesFile = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProfilesFile::default(),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let mut state = StoreState::default();
        for profile in file.profiles {
            state.profiles.insert(profile.profile_id.clone(), profile);
        }
        for coordinate in file.coordinates {
            let key = (coordinate.profile_id.clone(), coordinate.element_type);
            state.coordinates.insert(key, coordinate);
        }
        debug!(
            "loaded {} profile(s) and {} coordinate(s) from {}",
            state.profiles.len(),
            state.coordinates.len(),
            path.display()
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Writes the whole store to a profiles file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
    pub async fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let file = {
            let state = self.state.read().await;
            ProfilesFile {
                profiles: state.profiles.values().cloned().collect(),
                coordinates: state.coordinates.values().cloned().collect(),
            }
        };
        write_toml(path, &file)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<DeviceProfile>, StoreError> {
        Ok(self.state.read().await.profiles.get(profile_id).cloned())
    }

    async fn upsert_coordinate(&self, coordinate: CoordinateConfig) -> Result<CoordinateConfig, StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let profile = state
            .profiles
            .get(&coordinate.profile_id)
            .ok_or_else(|| StoreError::ProfileNotFound(coordinate.profile_id.clone()))?;
        if !profile.resolution.contains(coordinate.x, coordinate.y) {
            return Err(StoreError::OutOfBounds {
                profile_id: coordinate.profile_id.clone(),
                x: coordinate.x,
                y: coordinate.y,
            });
        }

        let key = (coordinate.profile_id.clone(), coordinate.element_type);
        let stored = match state.coordinates.get_mut(&key) {
            Some(existing) => {
                existing.supersede_with(coordinate);
                existing.clone()
            }
            None => {
                state.coordinates.insert(key, coordinate.clone());
                coordinate
            }
        };
        Ok(stored)
    }

    async fn set_calibrated(&self, profile_id: &str, confidence: f64) -> Result<DeviceProfile, StoreError> {
        let mut state = self.state.write().await;
        let profile = state
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::ProfileNotFound(profile_id.to_string()))?;
        profile.mark_calibrated(confidence, Utc::now())?;
        Ok(profile.clone())
    }

    async fn coordinates(&self, profile_id: &str) -> Result<Vec<CoordinateConfig>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .coordinates
            .iter()
            .filter(|((owner, _), _)| owner == profile_id)
            .map(|(_, c)| c.clone())
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use calib_core::{CalibrationMethod, Resolution};
    use chrono::{TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    fn profile(id: &str) -> DeviceProfile {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut p = DeviceProfile::new(id, Resolution::new(1080, 2400), 420, at);
        p.add_device_id("R58M123", at);
        p
    }

    fn click(profile_id: &str, element: ElementType, x: u32, y: u32, minute: u32) -> CoordinateConfig {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap();
        CoordinateConfig::from_user_click(profile_id, element, "elem", x, y, "admin", at)
    }

    #[tokio::test]
    async fn test_get_unknown_profile_is_none() {
        let store = InMemoryProfileStore::new();
        assert!(store.get_profile("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        // Arrange
        let store = InMemoryProfileStore::with_profiles([profile("p1")]);

        // Act
        store.upsert_coordinate(click("p1", ElementType::TitleField, 10, 20, 0)).await.unwrap();
        let stored = store
            .upsert_coordinate(click("p1", ElementType::TitleField, 30, 40, 5))
            .await
            .unwrap();

        // Assert: one record, latest position, original creation time
        let all = store.coordinates("p1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!((stored.x, stored.y), (30, 40));
        assert_eq!(stored.created_at, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(stored.updated_at, Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap());
    }

    #[tokio::test]
    async fn test_upsert_for_unknown_profile_fails() {
        let store = InMemoryProfileStore::new();
        let result = store.upsert_coordinate(click("ghost", ElementType::TitleField, 1, 1, 0)).await;
        assert!(matches!(result, Err(StoreError::ProfileNotFound(id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_upsert_outside_screen_is_refused() {
        let store = InMemoryProfileStore::with_profiles([profile("p1")]);
        let result = store.upsert_coordinate(click("p1", ElementType::TitleField, 1080, 0, 0)).await;
        assert!(matches!(result, Err(StoreError::OutOfBounds { x: 1080, .. })));
        assert!(store.coordinates("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_coordinates_are_scoped_to_profile() {
        // Arrange
        let store = InMemoryProfileStore::with_profiles([profile("p1"), profile("p2")]);
        store.upsert_coordinate(click("p1", ElementType::TitleField, 1, 1, 0)).await.unwrap();
        store.upsert_coordinate(click("p2", ElementType::ContentField, 2, 2, 0)).await.unwrap();

        // Act
        let p1 = store.coordinates("p1").await.unwrap();

        // Assert
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].element_type, ElementType::TitleField);
    }

    #[tokio::test]
    async fn test_set_calibrated_records_confidence() {
        let store = InMemoryProfileStore::with_profiles([profile("p1")]);
        let updated = assert_ok!(store.set_calibrated("p1", 0.95).await);
        assert!(updated.calibrated);
        assert_eq!(updated.calibration_confidence, 0.95);
    }

    #[tokio::test]
    async fn test_set_calibrated_rejects_out_of_range_confidence() {
        let store = InMemoryProfileStore::with_profiles([profile("p1")]);
        let error = assert_err!(store.set_calibrated("p1", 1.5).await);
        assert!(matches!(error, StoreError::InvalidRecord(_)));
        assert!(!store.get_profile("p1").await.unwrap().unwrap().calibrated);
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_profiles_and_coordinates() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("calib-profiles-{}", uuid::Uuid::new_v4()));
        let path = dir.join("profiles.toml");
        let store = InMemoryProfileStore::with_profiles([profile("p1")]);
        store.upsert_coordinate(click("p1", ElementType::PublishButton, 900, 2200, 0)).await.unwrap();

        // Act
        store.save_to(&path).await.unwrap();
        let restored = InMemoryProfileStore::load_from(&path).unwrap();

        // Assert
        assert_eq!(restored.profile_ids().await, vec!["p1".to_string()]);
        let coords = restored.coordinates("p1").await.unwrap();
        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].method, CalibrationMethod::UserClick);
        assert_eq!((coords[0].x, coords[0].y), (900, 2200));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_missing_profiles_file_gives_empty_store() {
        let path = std::env::temp_dir().join(format!("calib-absent-{}.toml", uuid::Uuid::new_v4()));
        let store = InMemoryProfileStore::load_from(&path).unwrap();
        assert!(store.state.try_read().unwrap().profiles.is_empty());
    }
}
