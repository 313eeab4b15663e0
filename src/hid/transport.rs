//! # Feature Report Transport
//!
//! GET/SET feature-report exchanges on top of the [`DeviceCache`].
//!
//! Both directions watch for "device gone" failures. When one is seen the
//! cached handle for that path is evicted and closed, so the next exchange
//! triggers a fresh open attempt instead of reusing a dead handle.

use tracing::{debug, warn};

use super::cache::DeviceCache;
use super::{HidBackend, HidDeviceInfo, HidIoError};
use crate::error::{DriftGuardError, Result};

/// Feature-report request/response exchanges, addressed by device path.
#[derive(Debug)]
pub struct FeatureReportTransport {
    cache: DeviceCache,
}

impl FeatureReportTransport {
    pub fn new(backend: Box<dyn HidBackend>) -> Self {
        Self {
            cache: DeviceCache::new(backend),
        }
    }

    /// Read feature report `report_id` into a `size`-byte buffer.
    ///
    /// The returned bytes keep the report-ID framing byte at index 0 so callers
    /// can address fixed offsets exactly as they appear on the wire.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Raw response
    /// * `Ok(None)` - No data currently available (non-blocking; not fatal)
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `size` is zero
    /// - `Open` if the path cannot be opened
    /// - `Transport` if the exchange fails; the handle is evicted on disconnect
    pub fn get_feature_report(
        &mut self,
        path: &str,
        report_id: u8,
        size: usize,
    ) -> Result<Option<Vec<u8>>> {
        if size == 0 {
            return Err(DriftGuardError::InvalidArgument(
                "feature report size must be at least 1 byte".to_string(),
            ));
        }

        let mut buf = vec![0u8; size];
        buf[0] = report_id;

        let result = {
            let handle = self.cache.open(path)?;
            handle.io().get_feature_report(&mut buf)
        };

        match result {
            Ok(0) => {
                debug!("No data for feature report 0x{:02X} from {}", report_id, path);
                Ok(None)
            }
            Ok(len) => {
                buf.truncate(len);
                if buf[0] != report_id {
                    warn!(
                        "Feature report ID mismatch from {}: expected 0x{:02X}, got 0x{:02X}",
                        path, report_id, buf[0]
                    );
                }
                Ok(Some(buf))
            }
            Err(e) => Err(self.transport_failure(path, "get feature report", e)),
        }
    }

    /// Send `data` as feature report `report_id` (the ID byte is prepended here).
    ///
    /// Returns `false` on any open or transport failure; failures are logged,
    /// never raised.
    pub fn set_feature_report(&mut self, path: &str, report_id: u8, data: &[u8]) -> bool {
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(report_id);
        report.extend_from_slice(data);

        let result = match self.cache.open(path) {
            Ok(handle) => handle.io().send_feature_report(&report),
            Err(e) => {
                warn!("Cannot send feature report 0x{:02X}: {}", report_id, e);
                return false;
            }
        };

        match result {
            Ok(()) => {
                debug!(
                    "Sent feature report 0x{:02X} ({} bytes) to {}",
                    report_id,
                    report.len(),
                    path
                );
                true
            }
            Err(e) => {
                let err = self.transport_failure(path, "send feature report", e);
                warn!("{}", err);
                false
            }
        }
    }

    /// Non-blocking read of one input report through the cached handle.
    ///
    /// # Errors
    ///
    /// Same eviction policy as [`Self::get_feature_report`].
    pub fn read_input(&mut self, path: &str, buf: &mut [u8]) -> Result<usize> {
        let result = {
            let handle = self.cache.open(path)?;
            handle.io().read(buf)
        };
        result.map_err(|e| self.transport_failure(path, "read input report", e))
    }

    /// Enumerate HID interfaces through the underlying backend.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the OS enumeration call fails.
    pub fn enumerate(&mut self) -> Result<Vec<HidDeviceInfo>> {
        self.cache
            .backend_mut()
            .enumerate()
            .map_err(|e| DriftGuardError::Transport {
                path: "<enumerate>".to_string(),
                reason: e.to_string(),
            })
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DeviceCache {
        &mut self.cache
    }

    /// Convert a handle failure into `Transport`, evicting the handle if the device is gone.
    fn transport_failure(&mut self, path: &str, action: &str, e: HidIoError) -> DriftGuardError {
        if e.is_disconnect() {
            warn!("Device at {} disconnected during {}: {}", path, action, e);
            self.cache.close(path);
        }
        DriftGuardError::Transport {
            path: path.to_string(),
            reason: format!("failed to {}: {}", action, e),
        }
    }
}
