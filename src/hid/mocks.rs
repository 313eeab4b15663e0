//! Simulated HID bus for tests.
//!
//! Stateful stand-in for the OS HID subsystem: devices can be plugged,
//! unplugged, made unresponsive, or forced to fail. Simulated DualSense devices
//! answer the serial/calibration request protocol and echo calibration writes
//! back on the next read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{HidBackend, HidDeviceInfo, HidHandle, HidIoError, REPORT_SIZE};

const SONY_VENDOR_ID: u16 = 0x054C;
const DUALSENSE_PRODUCT_ID: u16 = 0x0CE6;
const DUALSENSE_EDGE_PRODUCT_ID: u16 = 0x0DF2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest {
    Serial,
    Calibration,
}

/// One simulated HID interface.
#[derive(Debug, Clone)]
pub struct SimDevice {
    info: HidDeviceInfo,
    present: bool,
    responsive: bool,
    bluetooth: bool,
    open_fails: bool,
    serial: String,
    calibration: [u8; 28],
    overrides: HashMap<u8, Vec<u8>>,
    fail_next_get: Option<String>,
    pending: Option<PendingRequest>,
    sent: Vec<Vec<u8>>,
    reads: usize,
}

impl SimDevice {
    fn new(path: &str, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> Self {
        Self {
            info: HidDeviceInfo {
                path: path.to_string(),
                vendor_id,
                product_id,
                usage_page,
                usage,
                product_string: Some("Wireless Controller".to_string()),
            },
            present: true,
            responsive: true,
            bluetooth: false,
            open_fails: false,
            serial: "a0b1c2d3e4f5g6h7i".to_string(),
            calibration: std::array::from_fn(|i| i as u8 + 1),
            overrides: HashMap::new(),
            fail_next_get: None,
            pending: None,
            sent: Vec::new(),
            reads: 0,
        }
    }

    /// DualSense (PS5) gamepad interface over USB.
    pub fn dualsense(path: &str) -> Self {
        Self::new(path, SONY_VENDOR_ID, DUALSENSE_PRODUCT_ID, 0x01, 0x05)
    }

    /// DualSense Edge gamepad interface over USB.
    pub fn dualsense_edge(path: &str) -> Self {
        Self::new(path, SONY_VENDOR_ID, DUALSENSE_EDGE_PRODUCT_ID, 0x01, 0x05)
    }

    /// Arbitrary device with the given IDs and usage.
    pub fn other(path: &str, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> Self {
        let mut device = Self::new(path, vendor_id, product_id, usage_page, usage);
        device.info.product_string = None;
        device
    }

    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_string();
        self
    }

    pub fn with_calibration(mut self, calibration: [u8; 28]) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn over_bluetooth(mut self) -> Self {
        self.bluetooth = true;
        self
    }

    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    fn answer_get(&mut self, buf: &mut [u8]) -> Result<usize, HidIoError> {
        if let Some(message) = self.fail_next_get.take() {
            return Err(HidIoError::Other(message));
        }

        let report_id = buf[0];
        if let Some(response) = self.overrides.get(&report_id) {
            let len = response.len().min(buf.len());
            buf[..len].copy_from_slice(&response[..len]);
            return Ok(len);
        }

        let mut response = [0u8; REPORT_SIZE];
        response[0] = report_id;
        match report_id {
            0x81 => match self.pending.take() {
                Some(PendingRequest::Serial) => {
                    let bytes = self.serial.as_bytes();
                    let len = bytes.len().min(17);
                    response[4..4 + len].copy_from_slice(&bytes[..len]);
                }
                Some(PendingRequest::Calibration) => {
                    response[4..32].copy_from_slice(&self.calibration);
                }
                None => return Ok(0),
            },
            0x83 => {
                if self.bluetooth {
                    response[60] = 0x01;
                    response[61] = 0x02;
                }
            }
            _ => return Ok(0),
        }

        let len = REPORT_SIZE.min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn accept_set(&mut self, data: &[u8]) {
        self.sent.push(data.to_vec());
        if data.first() != Some(&0x80) {
            return;
        }
        match &data[1..] {
            [0x01, 0x13, 0x01, ..] => self.pending = Some(PendingRequest::Serial),
            [0x0C, 0x04, 0x00, ..] => self.pending = Some(PendingRequest::Calibration),
            [0x0C, 0x01, payload @ ..] if payload.len() >= 28 => {
                self.calibration.copy_from_slice(&payload[..28]);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    devices: Vec<SimDevice>,
    open_count: usize,
    close_count: usize,
    enumerate_count: usize,
}

impl BusState {
    fn device_mut(&mut self, path: &str) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.info.path == path)
    }

    fn live_device_mut(&mut self, path: &str) -> Result<&mut SimDevice, HidIoError> {
        match self.device_mut(path) {
            Some(device) if device.present => Ok(device),
            _ => Err(HidIoError::NoDevice),
        }
    }
}

/// Shared simulated bus. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_device<T>(&self, path: &str, f: impl FnOnce(&mut SimDevice) -> T) -> T {
        let mut state = self.state();
        let device = state
            .device_mut(path)
            .unwrap_or_else(|| panic!("no simulated device at {}", path));
        f(device)
    }

    pub fn add(&self, device: SimDevice) {
        self.state().devices.push(device);
    }

    /// Boxed backend view of this bus.
    pub fn backend(&self) -> Box<dyn HidBackend> {
        Box::new(self.clone())
    }

    pub fn unplug(&self, path: &str) {
        self.with_device(path, |d| d.present = false);
    }

    pub fn replug(&self, path: &str) {
        self.with_device(path, |d| d.present = true);
    }

    pub fn set_responsive(&self, path: &str, responsive: bool) {
        self.with_device(path, |d| d.responsive = responsive);
    }

    pub fn set_open_fails(&self, path: &str, fails: bool) {
        self.with_device(path, |d| d.open_fails = fails);
    }

    pub fn set_bluetooth(&self, path: &str, bluetooth: bool) {
        self.with_device(path, |d| d.bluetooth = bluetooth);
    }

    /// Answer every GET of `report_id` with `response` verbatim.
    pub fn set_override(&self, path: &str, report_id: u8, response: Vec<u8>) {
        self.with_device(path, |d| {
            d.overrides.insert(report_id, response);
        });
    }

    /// Fail the next GET with `message`.
    pub fn fail_next_get(&self, path: &str, message: &str) {
        self.with_device(path, |d| d.fail_next_get = Some(message.to_string()));
    }

    /// Every SET received by `path`, report ID included.
    pub fn sent_reports(&self, path: &str) -> Vec<Vec<u8>> {
        self.with_device(path, |d| d.sent.clone())
    }

    pub fn calibration(&self, path: &str) -> [u8; 28] {
        self.with_device(path, |d| d.calibration)
    }

    pub fn read_count(&self, path: &str) -> usize {
        self.with_device(path, |d| d.reads)
    }

    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    pub fn enumerate_count(&self) -> usize {
        self.state().enumerate_count
    }
}

impl HidBackend for SimulatedBus {
    fn enumerate(&mut self) -> Result<Vec<HidDeviceInfo>, HidIoError> {
        let mut state = self.state();
        state.enumerate_count += 1;
        Ok(state
            .devices
            .iter()
            .filter(|d| d.present)
            .map(|d| d.info.clone())
            .collect())
    }

    fn open_path(&mut self, path: &str) -> Result<Box<dyn HidHandle>, HidIoError> {
        let mut state = self.state();
        let device = state.live_device_mut(path)?;
        if device.open_fails {
            return Err(HidIoError::Other("Permission denied".to_string()));
        }
        state.open_count += 1;
        Ok(Box::new(SimHandle {
            path: path.to_string(),
            bus: self.clone(),
        }))
    }
}

struct SimHandle {
    path: String,
    bus: SimulatedBus,
}

impl HidHandle for SimHandle {
    fn set_nonblocking(&mut self, _nonblocking: bool) -> Result<(), HidIoError> {
        self.bus.state().live_device_mut(&self.path).map(|_| ())
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, HidIoError> {
        self.bus.state().live_device_mut(&self.path)?.answer_get(buf)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), HidIoError> {
        self.bus.state().live_device_mut(&self.path)?.accept_set(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HidIoError> {
        let mut state = self.bus.state();
        let device = state.live_device_mut(&self.path)?;
        device.reads += 1;
        if !device.responsive {
            return Ok(0);
        }
        let len = REPORT_SIZE.min(buf.len());
        buf[..len].fill(0x01);
        Ok(len)
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.bus.state().close_count += 1;
    }
}
