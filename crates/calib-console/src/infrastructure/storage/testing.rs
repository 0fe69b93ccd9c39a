//! Test wrapper around [`InMemoryProfileStore`] that injects timing and faults.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use calib_core::{CoordinateConfig, DeviceProfile};

use super::{InMemoryProfileStore, ProfileStore, StoreError};

/// Delegates to an in-memory store.
///
/// - `yield_on_write`: every coordinate write yields to the scheduler once
///   before landing, so concurrent submissions interleave.
/// - `fail_calibrations(n)`: the next `n` calls to `set_calibrated` fail with
///   [`StoreError::Backend`].
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: InMemoryProfileStore,
    yield_on_write: bool,
    failing_calibrations: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: InMemoryProfileStore) -> Self {
        Self {
            inner,
            yield_on_write: false,
            failing_calibrations: AtomicUsize::new(0),
        }
    }

    pub fn yield_on_write(mut self) -> Self {
        self.yield_on_write = true;
        self
    }

    pub fn fail_calibrations(self, count: usize) -> Self {
        self.failing_calibrations.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ProfileStore for FaultyStore {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<DeviceProfile>, StoreError> {
        self.inner.get_profile(profile_id).await
    }

    async fn upsert_coordinate(&self, coordinate: CoordinateConfig) -> Result<CoordinateConfig, StoreError> {
        if self.yield_on_write {
            tokio::task::yield_now().await;
        }
        self.inner.upsert_coordinate(coordinate).await
    }

    async fn set_calibrated(&self, profile_id: &str, confidence: f64) -> Result<DeviceProfile, StoreError> {
        let failing = self
            .failing_calibrations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Backend("offline".to_string()));
        }
        self.inner.set_calibrated(profile_id, confidence).await
    }

    async fn coordinates(&self, profile_id: &str) -> Result<Vec<CoordinateConfig>, StoreError> {
        self.inner.coordinates(profile_id).await
    }
}
