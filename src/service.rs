//! # Calibration Service
//!
//! User-triggered calibration read and write against the active session.
//!
//! Both operations need a connected session (taken from the polling loop's
//! latest snapshot) and hold the shared HID lock for the whole exchange, so
//! they never interleave with the loop's own probes or teardown. The async
//! entry points run the blocking exchange on tokio's blocking pool.

use std::sync::MutexGuard;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::calibration_file::CalibrationRecord;
use crate::controller::protocol::{read_calibration, read_serial, write_calibration};
use crate::controller::{CalibrationPayload, ConnectionType, ControllerIdentity};
use crate::error::{DriftGuardError, Result};
use crate::hid::{self, FeatureReportTransport, SharedTransport};
use crate::session::SessionSnapshot;

/// Serial recorded when the controller does not report a readable one.
pub const SERIAL_NOT_FOUND: &str = "Serial not found";

/// Calibration read/write for the connected controller.
#[derive(Debug, Clone)]
pub struct CalibrationService {
    transport: SharedTransport,
    snapshots: watch::Receiver<SessionSnapshot>,
    settle: Duration,
}

impl CalibrationService {
    /// `settle` is the pause between a request report and its response.
    pub fn new(
        transport: SharedTransport,
        snapshots: watch::Receiver<SessionSnapshot>,
        settle: Duration,
    ) -> Self {
        Self {
            transport,
            snapshots,
            settle,
        }
    }

    fn current_session(&self) -> Result<(ControllerIdentity, ConnectionType)> {
        let snapshot = self.snapshots.borrow();
        match (&snapshot.identity, snapshot.is_connected()) {
            (Some(identity), true) => Ok((identity.clone(), snapshot.connection)),
            _ => Err(DriftGuardError::NotConnected),
        }
    }

    /// Lock the transport for `identity`'s session.
    ///
    /// The polling loop closes the session's path under the same lock when it
    /// tears the session down, so a closed path means the snapshot is stale.
    fn lock_session(
        &self,
        identity: &ControllerIdentity,
    ) -> Result<MutexGuard<'_, FeatureReportTransport>> {
        let transport = hid::lock(&self.transport);
        if !transport.cache().is_open(&identity.path) {
            debug!("Session on {} ended before the HID lock was taken", identity.path);
            return Err(DriftGuardError::NotConnected);
        }
        Ok(transport)
    }

    /// Read serial number and calibration from the connected controller.
    ///
    /// An unreadable serial is recorded as [`SERIAL_NOT_FOUND`]; losing the
    /// device mid-read is an error.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without a connected session, or if the session ended
    ///   before the exchange could start
    /// - `Open`/`Transport` if the controller goes away
    /// - `Protocol` if the calibration response is malformed
    pub fn read_blocking(&self) -> Result<CalibrationRecord> {
        let (identity, _) = self.current_session()?;
        let mut transport = self.lock_session(&identity)?;

        let serial = match read_serial(&mut transport, &identity.path, self.settle) {
            Ok(serial) => serial,
            Err(e) if e.is_session_lost() => return Err(e),
            Err(e) => {
                warn!("Could not read serial number: {}", e);
                SERIAL_NOT_FOUND.to_string()
            }
        };
        let payload = read_calibration(&mut transport, &identity.path, self.settle)?;

        info!("Read calibration from {} ({})", identity.display_name, serial);
        Ok(CalibrationRecord {
            serial,
            controller_name: identity.display_name,
            payload,
        })
    }

    /// Write `payload` to the connected controller.
    ///
    /// # Errors
    ///
    /// - `NotConnected` without a connected session, or if the session ended
    ///   before the exchange could start
    /// - `UnsupportedOperation` over Bluetooth
    /// - `Open`/`Transport` if the controller goes away
    pub fn apply_blocking(&self, payload: &CalibrationPayload) -> Result<()> {
        let (identity, connection) = self.current_session()?;
        let mut transport = self.lock_session(&identity)?;
        write_calibration(&mut transport, &identity.path, connection, payload)?;
        info!("Calibration data applied to {}", identity.display_name);
        Ok(())
    }

    /// [`Self::read_blocking`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// As [`Self::read_blocking`], plus `Task` if the worker panics.
    pub async fn read_calibration(&self) -> Result<CalibrationRecord> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.read_blocking())
            .await
            .map_err(|e| DriftGuardError::Task(e.to_string()))?
    }

    /// [`Self::apply_blocking`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// As [`Self::apply_blocking`], plus `Task` if the worker panics.
    pub async fn apply_calibration(&self, payload: CalibrationPayload) -> Result<()> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.apply_blocking(&payload))
            .await
            .map_err(|e| DriftGuardError::Task(e.to_string()))?
    }
}
