//! # Controller Identity
//!
//! Supported-device allow-list and the per-session identity types.
//!
//! ## Supported Devices
//!
//! | Vendor | Product | Name                  |
//! |--------|---------|-----------------------|
//! | 0x054C | 0x0CE6  | Sony DualSense (PS5)  |
//! | 0x054C | 0x0DF2  | Sony DualSense Edge   |
//!
//! Additional entries can be appended from the `[devices]` config section.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sony vendor ID
pub const SONY_VENDOR_ID: u16 = 0x054C;

/// DualSense product ID (wired and Bluetooth)
pub const DUALSENSE_PRODUCT_ID: u16 = 0x0CE6;

/// DualSense Edge product ID
pub const DUALSENSE_EDGE_PRODUCT_ID: u16 = 0x0DF2;

/// Identity of the controller behind the active session.
///
/// Produced by discovery and discarded on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub display_name: String,
    /// HID interface path the session talks to.
    pub path: String,
}

/// Transport the controller is attached over.
///
/// Bluetooth sessions are read-only for calibration writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Usb,
    Bluetooth,
    /// The connection-type probe itself failed.
    Error,
}

impl ConnectionType {
    /// Whether calibration writes are allowed on this transport.
    ///
    /// Only an explicit Bluetooth result blocks writes.
    #[must_use]
    pub fn allows_writes(self) -> bool {
        self != Self::Bluetooth
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "Unknown",
            Self::Usb => "USB",
            Self::Bluetooth => "BT",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
}

impl SupportedDevice {
    pub fn new(vendor_id: u16, product_id: u16, name: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            name: name.into(),
        }
    }
}

/// Supported (vendor, product) table. First entry for a pair wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedDevices {
    entries: Vec<SupportedDevice>,
}

impl Default for SupportedDevices {
    fn default() -> Self {
        Self {
            entries: vec![
                SupportedDevice::new(SONY_VENDOR_ID, DUALSENSE_PRODUCT_ID, "Sony DualSense (PS5)"),
                SupportedDevice::new(SONY_VENDOR_ID, DUALSENSE_EDGE_PRODUCT_ID, "Sony DualSense Edge"),
            ],
        }
    }
}

impl SupportedDevices {
    /// Built-in table extended with `extra` entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use driftguard::controller::identity::{SupportedDevice, SupportedDevices};
    ///
    /// let devices = SupportedDevices::with_extra(vec![SupportedDevice::new(0x1234, 0x5678, "Test Pad")]);
    /// assert_eq!(devices.lookup(0x1234, 0x5678).map(|d| d.name.as_str()), Some("Test Pad"));
    /// assert!(devices.lookup(0x054C, 0x0CE6).is_some());
    /// ```
    pub fn with_extra(extra: impl IntoIterator<Item = SupportedDevice>) -> Self {
        let mut devices = Self::default();
        devices.entries.extend(extra);
        devices
    }

    pub fn lookup(&self, vendor_id: u16, product_id: u16) -> Option<&SupportedDevice> {
        self.entries
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SupportedDevice> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
