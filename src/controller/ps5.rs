//! # PS5 DualSense evdev Input
//!
//! [`JoystickProvider`] backed by the Linux evdev interface.
//!
//! ## Device Nodes
//!
//! The kernel `hid-playstation` driver exposes one DualSense as several
//! `/dev/input/event*` nodes (gamepad, motion sensors, touchpad). Only the
//! gamepad node is listed: it has both sticks and the face buttons.
//!
//! ## Input Axes
//!
//! - Left stick: ABS_X, ABS_Y (0-255)
//! - Right stick: ABS_RX, ABS_RY (0-255)
//! - Triggers: ABS_Z (L2), ABS_RZ (R2) (0-255)
//!
//! Axis state is read with the `EVIOCGABS` ioctl, which never blocks and fails
//! with `ENODEV` once the controller is gone.

use std::path::{Path, PathBuf};

use evdev::{AbsoluteAxisType, Device, Key};
use tracing::{debug, info};

use super::axes::{normalize_axis, normalize_trigger, AxisValues};
use super::joystick::{AxisReader, JoystickInfo, JoystickProvider};
use crate::error::{DriftGuardError, Result};

const INPUT_DIR: &str = "/dev/input";

/// Lists and opens gamepad event nodes under `/dev/input`.
#[derive(Debug)]
pub struct EvdevJoysticks {
    input_dir: PathBuf,
}

impl Default for EvdevJoysticks {
    fn default() -> Self {
        Self::new()
    }
}

impl EvdevJoysticks {
    pub fn new() -> Self {
        Self {
            input_dir: PathBuf::from(INPUT_DIR),
        }
    }

    /// Sorted `event*` nodes in the input directory.
    fn event_nodes(&self) -> Result<Vec<PathBuf>> {
        if !self.input_dir.exists() {
            return Err(DriftGuardError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} directory not found", self.input_dir.display()),
            )));
        }

        let mut nodes: Vec<PathBuf> = std::fs::read_dir(&self.input_dir)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().starts_with("event"))
                    .unwrap_or(false)
            })
            .collect();

        // Deterministic selection when several controllers are connected
        nodes.sort();
        Ok(nodes)
    }
}

/// Whether the device looks like a gamepad rather than a sensor or touchpad node.
fn is_gamepad(device: &Device) -> bool {
    let has_sticks = device.supported_absolute_axes().map_or(false, |axes| {
        axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_RX)
    });
    let has_buttons = device
        .supported_keys()
        .map_or(false, |keys| keys.contains(Key::BTN_SOUTH));
    has_sticks && has_buttons
}

impl JoystickProvider for EvdevJoysticks {
    fn joysticks(&mut self) -> Result<Vec<JoystickInfo>> {
        let mut joysticks = Vec::new();

        for path in self.event_nodes()? {
            match Device::open(&path) {
                Ok(device) => {
                    if !is_gamepad(&device) {
                        continue;
                    }
                    let id = device.input_id();
                    debug!(
                        "Found gamepad node: {} (vendor: 0x{:04x}, product: 0x{:04x})",
                        path.display(),
                        id.vendor(),
                        id.product()
                    );
                    joysticks.push(JoystickInfo {
                        id: path.to_string_lossy().into_owned(),
                        name: device.name().unwrap_or("Unknown").to_string(),
                        vendor_id: Some(id.vendor()),
                        product_id: Some(id.product()),
                    });
                }
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                }
            }
        }

        Ok(joysticks)
    }

    fn open(&mut self, info: &JoystickInfo) -> Result<Box<dyn AxisReader>> {
        let reader = EvdevAxisReader::open(Path::new(&info.id))?;
        info!("Opened joystick {} at {}", reader.name(), info.id);
        Ok(Box::new(reader))
    }
}

/// Open gamepad event node.
pub struct EvdevAxisReader {
    device: Device,
    name: String,
}

impl EvdevAxisReader {
    /// Open the event node at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the node cannot be opened (permissions, unplugged).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use driftguard::controller::joystick::AxisReader;
    /// use driftguard::controller::ps5::EvdevAxisReader;
    ///
    /// let mut reader = EvdevAxisReader::open(std::path::Path::new("/dev/input/event5"))?;
    /// let axes = reader.sample()?;
    /// println!("{}: left stick ({:.2}, {:.2})", reader.name(), axes.left_x, axes.left_y);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let device = Device::open(path)?;
        let name = device.name().unwrap_or("Unknown").to_string();
        Ok(Self { device, name })
    }
}

impl AxisReader for EvdevAxisReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> Result<AxisValues> {
        let state = self.device.get_abs_state()?;

        let stick = |axis: AbsoluteAxisType| {
            let info = &state[axis.0 as usize];
            normalize_axis(info.value, info.minimum, info.maximum)
        };
        let trigger = |axis: AbsoluteAxisType| {
            let info = &state[axis.0 as usize];
            normalize_trigger(info.value, info.minimum, info.maximum)
        };

        Ok(AxisValues {
            left_x: stick(AbsoluteAxisType::ABS_X),
            left_y: stick(AbsoluteAxisType::ABS_Y),
            right_x: stick(AbsoluteAxisType::ABS_RX),
            right_y: stick(AbsoluteAxisType::ABS_RY),
            left_trigger: trigger(AbsoluteAxisType::ABS_Z),
            right_trigger: trigger(AbsoluteAxisType::ABS_RZ),
        })
    }
}
