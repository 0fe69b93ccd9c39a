//! Rendered-surface to device-pixel coordinate transform.
//!
//! The operator sees the device screenshot drawn on a surface whose on-screen
//! size (the *render* size) is usually smaller than the screenshot's own pixel
//! size (the *native* size).  A click at `(client_x, client_y)` relative to the
//! surface's top-left corner is mapped proportionally:
//!
//! ```text
//! scale_x = native_width  / render_width
//! scale_y = native_height / render_height
//! x = round(client_x * scale_x)
//! y = round(client_y * scale_y)
//! ```
//!
//! The result is clamped to `[0, native_width - 1] × [0, native_height - 1]`
//! so that a click on the very last rendered pixel never lands one pixel past
//! the device edge.
//!
//! # Why not truncate? (for beginners)
//!
//! Casting `539.6_f64 as u32` yields `539`, which is off by one from the pixel
//! the operator actually clicked.  `f64::round` rounds half away from zero,
//! which for the non-negative positions used here is the same as browser
//! `Math.round`.

use thiserror::Error;

/// Errors produced by [`surface_to_device`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// The surface has no usable geometry yet (not laid out, or no frame shown).
    #[error("invalid surface state: {reason}")]
    InvalidSurfaceState { reason: &'static str },
}

/// Size of the displayed surface and of the frame drawn on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    /// On-screen width of the surface, in presentation units.
    pub render_width: f64,
    /// On-screen height of the surface, in presentation units.
    pub render_height: f64,
    /// Pixel width of the frame currently shown.
    pub native_width: u32,
    /// Pixel height of the frame currently shown.
    pub native_height: u32,
}

impl SurfaceGeometry {
    /// Creates a geometry from render and native sizes.
    pub fn new(render_width: f64, render_height: f64, native_width: u32, native_height: u32) -> Self {
        Self {
            render_width,
            render_height,
            native_width,
            native_height,
        }
    }

    /// Returns `(scale_x, scale_y)` after validating the geometry.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::InvalidSurfaceState`] if either render
    /// dimension is zero, negative or not finite, or if the native size is
    /// zero.
    pub fn scale(&self) -> Result<(f64, f64), TransformError> {
        if !(self.render_width.is_finite() && self.render_height.is_finite()) {
            return Err(TransformError::InvalidSurfaceState {
                reason: "render size is not finite",
            });
        }
        if self.render_width <= 0.0 || self.render_height <= 0.0 {
            return Err(TransformError::InvalidSurfaceState {
                reason: "surface has not been laid out (zero render size)",
            });
        }
        if self.native_width == 0 || self.native_height == 0 {
            return Err(TransformError::InvalidSurfaceState {
                reason: "frame has zero native size",
            });
        }
        Ok((
            self.native_width as f64 / self.render_width,
            self.native_height as f64 / self.render_height,
        ))
    }
}

/// Pointer position relative to the surface's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPosition {
    pub client_x: f64,
    pub client_y: f64,
}

impl PointerPosition {
    pub fn new(client_x: f64, client_y: f64) -> Self {
        Self { client_x, client_y }
    }
}

/// A point in device pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePoint {
    pub x: u32,
    pub y: u32,
}

/// Maps a pointer position on a rendered surface into device pixels.
///
/// # Errors
///
/// Returns [`TransformError::InvalidSurfaceState`] when the geometry is
/// unusable (see [`SurfaceGeometry::scale`]) or the pointer position is not
/// finite.
///
/// # Example
///
/// ```rust
/// use calib_core::{surface_to_device, PointerPosition, SurfaceGeometry};
///
/// let surface = SurfaceGeometry::new(360.0, 800.0, 1080, 2400);
/// let point = surface_to_device(&surface, PointerPosition::new(180.0, 400.0)).unwrap();
/// assert_eq!((point.x, point.y), (540, 1200));
/// ```
pub fn surface_to_device(
    surface: &SurfaceGeometry,
    pointer: PointerPosition,
) -> Result<DevicePoint, TransformError> {
    let (scale_x, scale_y) = surface.scale()?;

    if !(pointer.client_x.is_finite() && pointer.client_y.is_finite()) {
        return Err(TransformError::InvalidSurfaceState {
            reason: "pointer position is not finite",
        });
    }

    Ok(DevicePoint {
        x: scale_axis(pointer.client_x, scale_x, surface.native_width),
        y: scale_axis(pointer.client_y, scale_y, surface.native_height),
    })
}

/// Scales one axis and clamps it into `[0, native - 1]`.
fn scale_axis(client: f64, scale: f64, native: u32) -> u32 {
    let max = (native - 1) as f64;
    (client * scale).round().clamp(0.0, max) as u32
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn phone_surface() -> SurfaceGeometry {
        SurfaceGeometry::new(360.0, 800.0, 1080, 2400)
    }

    #[test]
    fn test_center_click_scales_by_three() {
        // Arrange
        let surface = phone_surface();

        // Act
        let p = surface_to_device(&surface, PointerPosition::new(180.0, 400.0)).unwrap();

        // Assert
        assert_eq!(p, DevicePoint { x: 540, y: 1200 });
    }

    #[test]
    fn test_origin_maps_to_origin() {
        let p = surface_to_device(&phone_surface(), PointerPosition::new(0.0, 0.0)).unwrap();
        assert_eq!(p, DevicePoint { x: 0, y: 0 });
    }

    #[test]
    fn test_far_edge_clamps_to_last_pixel() {
        // Arrange: clicking exactly on the render edge would map to native_width
        let surface = phone_surface();

        // Act
        let p = surface_to_device(&surface, PointerPosition::new(360.0, 800.0)).unwrap();

        // Assert: one pixel inside the device
        assert_eq!(p, DevicePoint { x: 1079, y: 2399 });
    }

    #[test]
    fn test_negative_position_clamps_to_zero() {
        let p = surface_to_device(&phone_surface(), PointerPosition::new(-4.0, -0.2)).unwrap();
        assert_eq!(p, DevicePoint { x: 0, y: 0 });
    }

    #[test]
    fn test_fractional_position_rounds_to_nearest() {
        // Arrange: 1:3 scale, 100.2 * 3 = 300.6 → 301 ; 100.1 * 3 = 300.3 → 300
        let surface = phone_surface();

        // Act
        let p = surface_to_device(&surface, PointerPosition::new(100.2, 100.1)).unwrap();

        // Assert
        assert_eq!(p, DevicePoint { x: 301, y: 300 });
    }

    #[test]
    fn test_half_rounds_away_from_zero() {
        // Arrange: 2x render size, native 1 : render 2 → scale 0.5
        let surface = SurfaceGeometry::new(200.0, 200.0, 100, 100);

        // Act: 3 * 0.5 = 1.5 → 2
        let p = surface_to_device(&surface, PointerPosition::new(3.0, 5.0)).unwrap();

        // Assert
        assert_eq!(p, DevicePoint { x: 2, y: 3 });
    }

    #[test]
    fn test_upscaled_surface_maps_down() {
        // Render larger than native (operator zoomed in).
        let surface = SurfaceGeometry::new(2160.0, 4800.0, 1080, 2400);
        let p = surface_to_device(&surface, PointerPosition::new(1000.0, 2000.0)).unwrap();
        assert_eq!(p, DevicePoint { x: 500, y: 1000 });
    }

    #[test]
    fn test_non_uniform_scale_axes_are_independent() {
        let surface = SurfaceGeometry::new(540.0, 600.0, 1080, 2400);
        let p = surface_to_device(&surface, PointerPosition::new(270.0, 300.0)).unwrap();
        assert_eq!(p, DevicePoint { x: 540, y: 1200 });
    }

    #[test]
    fn test_zero_render_width_is_invalid_surface_state() {
        // Arrange
        let surface = SurfaceGeometry::new(0.0, 800.0, 1080, 2400);

        // Act
        let result = surface_to_device(&surface, PointerPosition::new(1.0, 1.0));

        // Assert
        assert!(matches!(
            result,
            Err(TransformError::InvalidSurfaceState { .. })
        ));
    }

    #[test]
    fn test_zero_render_height_is_invalid_surface_state() {
        let surface = SurfaceGeometry::new(360.0, 0.0, 1080, 2400);
        assert!(surface_to_device(&surface, PointerPosition::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_zero_native_size_is_invalid_surface_state() {
        let surface = SurfaceGeometry::new(360.0, 800.0, 0, 2400);
        assert!(surface_to_device(&surface, PointerPosition::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_nan_render_size_is_invalid_surface_state() {
        let surface = SurfaceGeometry::new(f64::NAN, 800.0, 1080, 2400);
        assert!(surface_to_device(&surface, PointerPosition::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_infinite_pointer_is_invalid_surface_state() {
        let result = surface_to_device(&phone_surface(), PointerPosition::new(f64::INFINITY, 1.0));
        assert_eq!(
            result,
            Err(TransformError::InvalidSurfaceState {
                reason: "pointer position is not finite",
            })
        );
    }

    #[test]
    fn test_single_pixel_native_always_maps_to_zero() {
        let surface = SurfaceGeometry::new(50.0, 50.0, 1, 1);
        let p = surface_to_device(&surface, PointerPosition::new(49.0, 25.0)).unwrap();
        assert_eq!(p, DevicePoint { x: 0, y: 0 });
    }

    #[test]
    fn test_scale_returns_ratio_per_axis() {
        let (sx, sy) = SurfaceGeometry::new(360.0, 1200.0, 1080, 2400).scale().unwrap();
        assert!((sx - 3.0).abs() < f64::EPSILON);
        assert!((sy - 2.0).abs() < f64::EPSILON);
    }
}
