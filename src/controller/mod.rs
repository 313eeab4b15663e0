//! # Controller Module
//!
//! DualSense / DualSense Edge support.
//!
//! This module handles:
//! - Supported-device allow-list and session identity ([`identity`])
//! - Finding a live controller on the HID bus ([`discovery`])
//! - Serial number, calibration and connection-type reports ([`protocol`])
//! - The opaque calibration block ([`calibration`])
//! - Analog input sampling through the input layer ([`joystick`], [`ps5`])
//! - Correlating HID controllers with input-layer joysticks ([`matcher`])

pub mod axes;
pub mod calibration;
pub mod discovery;
pub mod identity;
pub mod joystick;
pub mod matcher;
pub mod protocol;
pub mod ps5;

pub use axes::AxisValues;
pub use calibration::CalibrationPayload;
pub use identity::{ConnectionType, ControllerIdentity, SupportedDevice, SupportedDevices};
pub use joystick::{AxisReader, JoystickInfo, JoystickProvider};
pub use matcher::{JoystickMatcher, MatchRule};
