//! # Axis Values
//!
//! Normalized analog input published with every session snapshot.
//!
//! Sticks are mapped to -1.0..=1.0 with 0.0 at center and triggers to
//! 0.0..=1.0. All six values are zero whenever no session is connected.
//!
//! ```
//! use driftguard::controller::axes::{normalize_axis, normalize_trigger};
//!
//! assert!((normalize_axis(0, 0, 255) - (-1.0)).abs() < 0.01);
//! assert!((normalize_axis(128, 0, 255)).abs() < 0.01);
//! assert!((normalize_trigger(255, 0, 255) - 1.0).abs() < 0.01);
//! ```

/// Live analog state of the connected controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisValues {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    /// L2
    pub left_trigger: f32,
    /// R2
    pub right_trigger: f32,
}

impl AxisValues {
    /// All axes at zero.
    pub const NEUTRAL: Self = Self {
        left_x: 0.0,
        left_y: 0.0,
        right_x: 0.0,
        right_y: 0.0,
        left_trigger: 0.0,
        right_trigger: 0.0,
    };

    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

/// Map a raw stick value within `min..=max` to -1.0..=1.0.
///
/// The center is `(min + max + 1) / 2`, so a 0..=255 axis centers at 128
/// like the DualSense reports at rest. Degenerate ranges map to 0.0.
#[must_use]
pub fn normalize_axis(raw: i32, min: i32, max: i32) -> f32 {
    if max <= min {
        return 0.0;
    }
    let center = (min as f32 + max as f32 + 1.0) / 2.0;
    let half_range = (max as f32 - min as f32) / 2.0;
    ((raw as f32 - center) / half_range).clamp(-1.0, 1.0)
}

/// Map a raw trigger value within `min..=max` to 0.0..=1.0.
#[must_use]
pub fn normalize_trigger(raw: i32, min: i32, max: i32) -> f32 {
    if max <= min {
        return 0.0;
    }
    ((raw - min) as f32 / (max - min) as f32).clamp(0.0, 1.0)
}
