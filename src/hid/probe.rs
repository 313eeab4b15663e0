//! # Responsiveness Prober
//!
//! Read-based liveness check. Enumeration keeps listing "ghost" interfaces for
//! a while after a controller goes away; a device only counts as present if a
//! non-blocking read actually returns data.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use super::transport::FeatureReportTransport;
use crate::error::Result;

/// Buffer length for every probe read.
pub const PROBE_BUFFER_LEN: usize = 64;

/// Which handle a probe reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Temporary handle, closed before returning. Used for discovery candidates.
    Scoped,
    /// The cache-owned handle, left open. Used for the active session.
    Cached,
}

/// Retry budget for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub tries: u32,
    pub delay: Duration,
}

impl ProbeSettings {
    pub fn new(tries: u32, delay: Duration) -> Self {
        Self { tries, delay }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            tries: 3,
            delay: Duration::from_millis(50),
        }
    }
}

/// Check whether the device at `path` produces input reports.
///
/// Performs up to `settings.tries` non-blocking reads of [`PROBE_BUFFER_LEN`]
/// bytes, sleeping `settings.delay` between attempts (never after the last).
/// Returns `true` on the first non-empty read; any open or read failure
/// returns `false`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use driftguard::hid::{is_responsive, FeatureReportTransport, HidApiBackend, ProbeMode, ProbeSettings};
///
/// let backend = HidApiBackend::new().unwrap();
/// let mut transport = FeatureReportTransport::new(Box::new(backend));
/// let settings = ProbeSettings::new(3, Duration::from_millis(50));
/// let alive = is_responsive(&mut transport, "/dev/hidraw0", settings, ProbeMode::Scoped);
/// println!("responsive: {}", alive);
/// ```
pub fn is_responsive(
    transport: &mut FeatureReportTransport,
    path: &str,
    settings: ProbeSettings,
    mode: ProbeMode,
) -> bool {
    let outcome = match mode {
        ProbeMode::Scoped => probe_scoped(transport, path, settings),
        ProbeMode::Cached => probe_cached(transport, path, settings),
    };

    match outcome {
        Ok(alive) => {
            if !alive {
                debug!("Device at {} returned no input after {} tries", path, settings.tries);
            }
            alive
        }
        Err(e) => {
            debug!("Probe of {} failed: {}", path, e);
            false
        }
    }
}

fn probe_scoped(
    transport: &mut FeatureReportTransport,
    path: &str,
    settings: ProbeSettings,
) -> Result<bool> {
    let mut handle = transport.cache_mut().open_scoped(path)?;
    let mut buf = [0u8; PROBE_BUFFER_LEN];

    let alive = retry_reads(settings, || {
        handle.io().read(&mut buf).map_err(|e| e.to_string())
    });
    Ok(alive)
}

fn probe_cached(
    transport: &mut FeatureReportTransport,
    path: &str,
    settings: ProbeSettings,
) -> Result<bool> {
    let mut buf = [0u8; PROBE_BUFFER_LEN];
    let mut failure = None;

    let alive = retry_reads(settings, || match transport.read_input(path, &mut buf) {
        Ok(n) => Ok(n),
        Err(e) => {
            let message = e.to_string();
            failure = Some(e);
            Err(message)
        }
    });

    match failure {
        Some(e) if !alive => Err(e),
        _ => Ok(alive),
    }
}

/// Run `read` up to `settings.tries` times. A read error ends the probe.
fn retry_reads<F>(settings: ProbeSettings, mut read: F) -> bool
where
    F: FnMut() -> std::result::Result<usize, String>,
{
    for attempt in 0..settings.tries {
        if attempt > 0 && !settings.delay.is_zero() {
            thread::sleep(settings.delay);
        }
        match read() {
            Ok(0) => trace!("Probe attempt {} returned no data", attempt + 1),
            Ok(_) => return true,
            Err(e) => {
                trace!("Probe attempt {} failed: {}", attempt + 1, e);
                return false;
            }
        }
    }
    false
}
