//! Device profiles and calibrated coordinates.
//!
//! A [`DeviceProfile`] describes one screen configuration (resolution + DPI)
//! that may be shared by several physical devices.  Each calibrated UI element
//! of that profile is stored as a [`CoordinateConfig`].  Profiles are created
//! and deleted outside this system; calibration only updates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::element::{CalibrationMethod, ElementType};

/// Touch tolerance recorded with every operator click, in device pixels.
pub const DEFAULT_TOUCH_RADIUS: u32 = 20;

/// Largest touch radius a coordinate may carry.
pub const MAX_TOUCH_RADIUS: u32 = 200;

/// Confidence recorded for coordinates taken from an operator click.
pub const USER_CLICK_CONFIDENCE: f64 = 0.95;

/// Confidence recorded for coordinates seeded from plan defaults.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Errors raised when building or mutating profile records.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProfileError {
    #[error("touch radius {0} outside 1..=200")]
    InvalidTouchRadius(u32),

    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),
}

/// Display resolution in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if `(x, y)` lies within `[0, width) × [0, height)`.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }
}

/// A screen configuration shared by one or more physical devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Unique profile identifier, e.g. `"samsung_sm-g960n_1080x2220"`.
    pub profile_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub os_version: String,
    pub resolution: Resolution,
    pub dpi: u32,
    /// Device identifiers mapped to this profile.  The first one is the
    /// streaming target during calibration.
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub calibrated: bool,
    #[serde(default)]
    pub calibration_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl DeviceProfile {
    /// Creates an uncalibrated profile with no devices mapped.
    pub fn new(profile_id: impl Into<String>, resolution: Resolution, dpi: u32, now: DateTime<Utc>) -> Self {
        Self {
            profile_id: profile_id.into(),
            model: String::new(),
            manufacturer: String::new(),
            os_version: String::new(),
            resolution,
            dpi,
            device_ids: Vec::new(),
            calibrated: false,
            calibration_confidence: 0.0,
            notes: None,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    /// Maps a device to this profile.  Adding the same id twice is a no-op.
    pub fn add_device_id(&mut self, device_id: impl Into<String>, now: DateTime<Utc>) {
        let device_id = device_id.into();
        if !self.device_ids.contains(&device_id) {
            self.device_ids.push(device_id);
            self.updated_at = now;
        }
    }

    /// The device streamed during calibration, if any is mapped.
    pub fn primary_device(&self) -> Option<&str> {
        self.device_ids.first().map(String::as_str)
    }

    /// Marks the profile calibrated with the given aggregate confidence.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidConfidence`] if `confidence` is not in `[0, 1]`.
    pub fn mark_calibrated(&mut self, confidence: f64, now: DateTime<Utc>) -> Result<(), ProfileError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ProfileError::InvalidConfidence(confidence));
        }
        self.calibrated = true;
        self.calibration_confidence = confidence;
        self.updated_at = now;
        Ok(())
    }
}

/// One calibrated UI element of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateConfig {
    pub profile_id: String,
    pub element_type: ElementType,
    pub element_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_description: Option<String>,
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub method: CalibrationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrated_at: Option<DateTime<Utc>>,
    pub touch_radius: u32,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub fail_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CoordinateConfig {
    /// Builds the record for an operator click.
    ///
    /// The coordinate is marked validated: a human looked at the live
    /// screen and pointed at the element.
    pub fn from_user_click(
        profile_id: impl Into<String>,
        element_type: ElementType,
        element_name: impl Into<String>,
        x: u32,
        y: u32,
        operator: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            element_type,
            element_name: element_name.into(),
            element_description: None,
            x,
            y,
            confidence: USER_CLICK_CONFIDENCE,
            validated: true,
            method: CalibrationMethod::UserClick,
            calibrated_by: Some(operator.into()),
            calibrated_at: Some(at),
            touch_radius: DEFAULT_TOUCH_RADIUS,
            usage_count: 0,
            success_count: 0,
            fail_count: 0,
            created_at: at,
            updated_at: at,
            last_used_at: None,
            notes: None,
        }
    }

    /// Builds an unvalidated placeholder from a default position.
    pub fn from_default(
        profile_id: impl Into<String>,
        element_type: ElementType,
        element_name: impl Into<String>,
        x: u32,
        y: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            validated: false,
            method: CalibrationMethod::Default,
            calibrated_by: None,
            calibrated_at: None,
            ..Self::from_user_click(profile_id, element_type, element_name, x, y, "", at)
        }
    }

    /// Replaces the touch radius.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidTouchRadius`] outside `1..=200`.
    pub fn with_touch_radius(mut self, radius: u32) -> Result<Self, ProfileError> {
        if !(1..=MAX_TOUCH_RADIUS).contains(&radius) {
            return Err(ProfileError::InvalidTouchRadius(radius));
        }
        self.touch_radius = radius;
        Ok(self)
    }

    /// Overwrites this record with a newer calibration of the same element,
    /// keeping its creation time and usage history.
    pub fn supersede_with(&mut self, newer: CoordinateConfig) {
        let created_at = self.created_at;
        let (usage, success, fail, last_used) =
            (self.usage_count, self.success_count, self.fail_count, self.last_used_at);
        *self = newer;
        self.created_at = created_at;
        self.usage_count = usage;
        self.success_count = success;
        self.fail_count = fail;
        self.last_used_at = last_used;
    }

    /// Records one automated tap attempt at this coordinate.
    pub fn record_usage(&mut self, success: bool, at: DateTime<Utc>) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
        self.last_used_at = Some(at);
        self.updated_at = at;
    }

    /// Fraction of successful attempts, or `0.0` before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
