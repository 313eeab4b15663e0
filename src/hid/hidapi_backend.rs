//! `hidapi`-backed implementation of [`HidBackend`] and [`HidHandle`].

use std::ffi::CString;

use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::debug;

use super::{HidBackend, HidDeviceInfo, HidHandle, HidIoError};
use crate::error::{DriftGuardError, Result};

/// Production HID backend over the platform `hidapi` library.
pub struct HidApiBackend {
    api: HidApi,
}

impl std::fmt::Debug for HidApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidApiBackend").finish_non_exhaustive()
    }
}

impl HidApiBackend {
    /// Initialize the platform HID library.
    ///
    /// # Errors
    ///
    /// Returns `Open` if `hidapi` cannot be initialized (missing hidraw support,
    /// a second live `HidApi` instance in the process).
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|e| DriftGuardError::Open {
            path: "hidapi".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { api })
    }
}

impl From<hidapi::HidError> for HidIoError {
    fn from(e: hidapi::HidError) -> Self {
        HidIoError::Other(e.to_string())
    }
}

impl From<&DeviceInfo> for HidDeviceInfo {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            path: info.path().to_string_lossy().into_owned(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            usage_page: info.usage_page(),
            usage: info.usage(),
            product_string: info.product_string().map(str::to_string),
        }
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&mut self) -> std::result::Result<Vec<HidDeviceInfo>, HidIoError> {
        self.api.refresh_devices()?;
        let devices: Vec<HidDeviceInfo> = self.api.device_list().map(HidDeviceInfo::from).collect();
        debug!("Enumerated {} HID interfaces", devices.len());
        Ok(devices)
    }

    fn open_path(&mut self, path: &str) -> std::result::Result<Box<dyn HidHandle>, HidIoError> {
        let c_path = CString::new(path)
            .map_err(|_| HidIoError::Other(format!("device path contains NUL: {:?}", path)))?;
        let device = self.api.open_path(&c_path)?;
        Ok(Box::new(HidApiHandle { device }))
    }
}

/// Open `hidapi` device. Closed when dropped.
struct HidApiHandle {
    device: HidDevice,
}

impl HidHandle for HidApiHandle {
    fn set_nonblocking(&mut self, nonblocking: bool) -> std::result::Result<(), HidIoError> {
        Ok(self.device.set_blocking_mode(!nonblocking)?)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> std::result::Result<usize, HidIoError> {
        Ok(self.device.get_feature_report(buf)?)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> std::result::Result<(), HidIoError> {
        Ok(self.device.send_feature_report(data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, HidIoError> {
        Ok(self.device.read(buf)?)
    }
}
