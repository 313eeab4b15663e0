//! # HID Module
//!
//! Direct USB HID access for DualSense controllers.
//!
//! This module handles:
//! - Enumerating and opening HID interfaces through a [`HidBackend`]
//! - Caching one open handle per device path ([`cache::DeviceCache`])
//! - Feature-report GET/SET exchanges with disconnect detection
//!   ([`transport::FeatureReportTransport`])
//! - Read-based liveness checks ([`probe::is_responsive`])
//!
//! The traits here are the seam between the session logic and the OS. The
//! production implementation lives in [`hidapi_backend`]; tests drive the same
//! code through a simulated bus.

pub mod cache;
pub mod hidapi_backend;
pub mod probe;
pub mod transport;

#[cfg(test)]
pub mod mocks;

use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use cache::{DeviceCache, DeviceHandle};
pub use hidapi_backend::HidApiBackend;
pub use probe::{is_responsive, ProbeMode, ProbeSettings};
pub use transport::FeatureReportTransport;

/// Size of every feature/input buffer exchanged with the controller.
pub const REPORT_SIZE: usize = 64;

/// Lower-cased fragments of OS error messages that mean the device is gone.
const DISCONNECT_MARKERS: &[&str] = &[
    "no such device",
    "failed to read",
    "failed to write",
    "device disconnected",
    "not connected",
];

/// Enumeration entry for one HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    /// Opaque OS path, unique per interface.
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// HID usage page of the top-level collection.
    pub usage_page: u16,
    /// HID usage within `usage_page`.
    pub usage: u16,
    pub product_string: Option<String>,
}

/// Low-level failure reported by a backend or handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HidIoError {
    /// The device behind the path no longer exists.
    #[error("no such device")]
    NoDevice,

    /// Any other OS-reported failure, carried verbatim.
    #[error("{0}")]
    Other(String),
}

impl HidIoError {
    /// Whether the error indicates the device was unplugged or its handle invalidated.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::NoDevice => true,
            Self::Other(message) => {
                let message = message.to_ascii_lowercase();
                DISCONNECT_MARKERS.iter().any(|marker| message.contains(marker))
            }
        }
    }
}

/// Access to the OS HID subsystem.
#[cfg_attr(test, mockall::automock)]
pub trait HidBackend: Send {
    /// List every HID interface currently exposed by the OS.
    fn enumerate(&mut self) -> std::result::Result<Vec<HidDeviceInfo>, HidIoError>;

    /// Open the interface at `path`.
    fn open_path(&mut self, path: &str) -> std::result::Result<Box<dyn HidHandle>, HidIoError>;
}

/// One open OS-level HID connection.
///
/// Dropping the handle closes it.
pub trait HidHandle: Send {
    fn set_nonblocking(&mut self, nonblocking: bool) -> std::result::Result<(), HidIoError>;

    /// Read a feature report. `buf[0]` holds the requested report ID on entry.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> std::result::Result<usize, HidIoError>;

    /// Send a feature report. `data[0]` is the report ID.
    fn send_feature_report(&mut self, data: &[u8]) -> std::result::Result<(), HidIoError>;

    /// Read one input report. Returns 0 when nothing is queued (non-blocking mode).
    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, HidIoError>;
}

/// Transport shared between the polling loop and user-triggered calibration work.
///
/// The mutex is the single HID-operations lock: one exchange in flight at a time.
pub type SharedTransport = Arc<Mutex<FeatureReportTransport>>;

/// Wrap a transport for sharing across tasks.
#[must_use]
pub fn share(transport: FeatureReportTransport) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}

/// Lock the shared transport, recovering the guard if a previous holder panicked.
pub fn lock(shared: &SharedTransport) -> MutexGuard<'_, FeatureReportTransport> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}
