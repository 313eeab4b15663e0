//! # Device Handle Cache
//!
//! Owns at most one open HID handle per device path. Handles are opened on
//! demand, reused across exchanges, and closed on error or shutdown.
//!
//! Open failures are reported to the caller and never retried here; retry
//! timing belongs to the polling loop.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info};

use super::{HidBackend, HidHandle, HidIoError};
use crate::error::{DriftGuardError, Result};

/// One open OS-level HID connection, always in non-blocking mode.
pub struct DeviceHandle {
    path: String,
    inner: Box<dyn HidHandle>,
    nonblocking: bool,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("nonblocking", &self.nonblocking)
            .finish_non_exhaustive()
    }
}

impl DeviceHandle {
    /// Open `path` through `backend` and switch it to non-blocking mode.
    fn open(backend: &mut dyn HidBackend, path: &str) -> Result<Self> {
        let open_error = |e: HidIoError| DriftGuardError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let mut inner = backend.open_path(path).map_err(open_error)?;
        inner.set_nonblocking(true).map_err(open_error)?;

        Ok(Self {
            path: path.to_string(),
            inner,
            nonblocking: true,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    pub(crate) fn io(&mut self) -> &mut dyn HidHandle {
        self.inner.as_mut()
    }
}

/// Path → open handle mapping.
pub struct DeviceCache {
    backend: Box<dyn HidBackend>,
    handles: HashMap<String, DeviceHandle>,
}

impl std::fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCache")
            .field("open_paths", &self.handles.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DeviceCache {
    pub fn new(backend: Box<dyn HidBackend>) -> Self {
        Self {
            backend,
            handles: HashMap::new(),
        }
    }

    /// Return the cached handle for `path`, opening and caching it if needed.
    ///
    /// # Errors
    ///
    /// Returns `Open` if the OS refuses the path or non-blocking mode cannot be set.
    pub fn open(&mut self, path: &str) -> Result<&mut DeviceHandle> {
        match self.handles.entry(path.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let handle = DeviceHandle::open(self.backend.as_mut(), path)?;
                info!("Opened HID device at {}", path);
                Ok(entry.insert(handle))
            }
        }
    }

    /// Open `path` without caching. The handle closes when the caller drops it.
    pub fn open_scoped(&mut self, path: &str) -> Result<DeviceHandle> {
        DeviceHandle::open(self.backend.as_mut(), path)
    }

    /// Close and evict the handle for `path`. Closing an unknown path is a no-op.
    pub fn close(&mut self, path: &str) {
        match self.handles.remove(path) {
            Some(handle) => {
                drop(handle);
                info!("Closed HID device at {}", path);
            }
            None => debug!("Close requested for {} but no handle is open", path),
        }
    }

    /// Close every cached handle. Never fails.
    pub fn close_all(&mut self) {
        if self.handles.is_empty() {
            return;
        }

        let count = self.handles.len();
        for (path, handle) in self.handles.drain() {
            drop(handle);
            debug!("Closed HID device at {}", path);
        }
        info!("Closed {} cached HID handle(s)", count);
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.handles.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn HidBackend {
        self.backend.as_mut()
    }
}

impl Drop for DeviceCache {
    fn drop(&mut self) {
        self.close_all();
    }
}
