//! # Joystick Input
//!
//! Abstraction over the OS input-polling API used to sample analog axes.
//!
//! The input API and the HID API are separate views of the same controller.
//! [`JoystickProvider`] lists the joysticks the input layer sees and opens one
//! for sampling; which one belongs to the HID session is decided by
//! [`super::matcher::JoystickMatcher`].

use super::axes::AxisValues;
use crate::error::Result;

/// Joystick as reported by the input layer.
///
/// Vendor/product IDs are optional because not every input API exposes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickInfo {
    /// Backend-specific identifier passed back to [`JoystickProvider::open`].
    pub id: String,
    pub name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// Source of joysticks.
pub trait JoystickProvider: Send {
    /// List the joysticks currently visible.
    ///
    /// # Errors
    ///
    /// Backend-specific failure to enumerate input devices.
    fn joysticks(&mut self) -> Result<Vec<JoystickInfo>>;

    /// Open a joystick for sampling.
    ///
    /// # Errors
    ///
    /// Backend-specific failure to open the device.
    fn open(&mut self, info: &JoystickInfo) -> Result<Box<dyn AxisReader>>;
}

/// Open joystick. Dropping it releases the device.
pub trait AxisReader: Send {
    fn name(&self) -> &str;

    /// Sample the current axis state without blocking.
    ///
    /// # Errors
    ///
    /// Any error means the joystick is no longer usable.
    fn sample(&mut self) -> Result<AxisValues>;
}
