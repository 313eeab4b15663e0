//! # Calibration Protocol
//!
//! Vendor feature-report exchanges for serial number, stick calibration and
//! transport detection.
//!
//! ## Wire Format
//!
//! All buffers are 64 bytes. Requests go out as report 0x80 and the answer is
//! read back from report 0x81 after a short settle delay:
//!
//! | Request (0x80 data)    | Response (0x81)                         |
//! |------------------------|-----------------------------------------|
//! | `01 13 01`             | serial number, ASCII at bytes 4..21     |
//! | `0C 04 00`             | calibration block at bytes 4..32        |
//! | `0C 01` + 28 bytes     | (write, no response)                    |
//!
//! Report 0x83 carries the connection type: a non-zero sum of bytes 60 and 61
//! means Bluetooth.
//!
//! These offsets come from reverse engineering and are not documented by the
//! vendor. They are kept exactly as observed.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::calibration::{CalibrationPayload, CALIBRATION_LEN};
use super::identity::ConnectionType;
use crate::error::{DriftGuardError, Result};
use crate::hid::{FeatureReportTransport, REPORT_SIZE};

/// Vendor request report ID.
pub const REQUEST_REPORT_ID: u8 = 0x80;

/// Vendor data response report ID.
pub const RESPONSE_REPORT_ID: u8 = 0x81;

/// Connection-type report ID.
pub const CONNECTION_REPORT_ID: u8 = 0x83;

/// Request: read serial number.
pub const SERIAL_REQUEST: [u8; 3] = [0x01, 0x13, 0x01];

/// Request: read calibration block.
pub const CALIBRATION_READ_REQUEST: [u8; 3] = [0x0C, 0x04, 0x00];

/// Request prefix: write calibration block.
pub const CALIBRATION_WRITE_PREFIX: [u8; 2] = [0x0C, 0x01];

const SERIAL_OFFSET: usize = 4;
const SERIAL_LEN: usize = 17;
const CALIBRATION_OFFSET: usize = 4;

/// Connection-type response bytes that are non-zero over Bluetooth.
const BT_MARKER_OFFSETS: (usize, usize) = (60, 61);

/// Message returned when a write is refused over Bluetooth.
pub const BLUETOOTH_WRITE_REJECTED: &str = "Calibration not supported when using Bluetooth.";

/// Build a request frame: `data` zero-padded to fill a 64-byte report after the ID byte.
fn request_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; REPORT_SIZE - 1];
    let len = data.len().min(frame.len());
    frame[..len].copy_from_slice(&data[..len]);
    frame
}

/// Send a 0x80 request, wait `settle`, and read the 0x81 response.
fn exchange(
    transport: &mut FeatureReportTransport,
    path: &str,
    request: &[u8],
    settle: Duration,
    what: &str,
) -> Result<Vec<u8>> {
    if !transport.set_feature_report(path, REQUEST_REPORT_ID, &request_frame(request)) {
        return Err(DriftGuardError::Transport {
            path: path.to_string(),
            reason: format!("{} request was not accepted", what),
        });
    }

    if !settle.is_zero() {
        thread::sleep(settle);
    }

    transport
        .get_feature_report(path, RESPONSE_REPORT_ID, REPORT_SIZE)?
        .ok_or_else(|| DriftGuardError::Protocol(format!("no {} response from controller", what)))
}

fn check_framing(response: &[u8], what: &str) -> Result<()> {
    match response.first() {
        Some(&RESPONSE_REPORT_ID) => Ok(()),
        Some(&other) => Err(DriftGuardError::Protocol(format!(
            "{} response has report ID 0x{:02X}, expected 0x{:02X}",
            what, other, RESPONSE_REPORT_ID
        ))),
        None => Err(DriftGuardError::Protocol(format!("empty {} response", what))),
    }
}

/// Decode the serial number from a 0x81 response.
///
/// Bytes 4..21 are read as ASCII; non-ASCII bytes are dropped, then the
/// result is trimmed (whitespace and NUL padding) and uppercased.
///
/// # Errors
///
/// Returns `Protocol` for a wrong framing byte, a response shorter than 21
/// bytes, or a serial that is empty after decoding.
///
/// # Examples
///
/// ```
/// use driftguard::controller::protocol::decode_serial;
///
/// let mut response = vec![0u8; 64];
/// response[0] = 0x81;
/// response[4..7].copy_from_slice(b"abc");
/// assert_eq!(decode_serial(&response).unwrap(), "ABC");
/// ```
pub fn decode_serial(response: &[u8]) -> Result<String> {
    check_framing(response, "serial number")?;

    let end = SERIAL_OFFSET + SERIAL_LEN;
    let raw = response.get(SERIAL_OFFSET..end).ok_or_else(|| {
        DriftGuardError::Protocol(format!(
            "serial number response too short: {} bytes, need {}",
            response.len(),
            end
        ))
    })?;

    let decoded: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    let serial = decoded
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_uppercase();

    if serial.is_empty() {
        return Err(DriftGuardError::Protocol(
            "serial number response contained no ASCII data".to_string(),
        ));
    }
    Ok(serial)
}

/// Extract the calibration block from a 0x81 response.
///
/// # Errors
///
/// Returns `Protocol` for a wrong framing byte or a response shorter than 32
/// bytes. A short response never yields a truncated payload.
pub fn extract_calibration(response: &[u8]) -> Result<CalibrationPayload> {
    check_framing(response, "calibration")?;

    let end = CALIBRATION_OFFSET + CALIBRATION_LEN;
    let block = response.get(CALIBRATION_OFFSET..end).ok_or_else(|| {
        DriftGuardError::Protocol(format!(
            "calibration response too short: {} bytes, need {}",
            response.len(),
            end
        ))
    })?;
    CalibrationPayload::from_slice(block)
}

/// Classify a 0x83 response.
///
/// Responses of 61 bytes or fewer (or none at all) are `Unknown`; bytes 60
/// and 61 are only inspected when present.
#[must_use]
pub fn classify_connection(response: Option<&[u8]>) -> ConnectionType {
    let (lo, hi) = BT_MARKER_OFFSETS;
    match response {
        Some(data) if data.len() > hi => {
            if u16::from(data[lo]) + u16::from(data[hi]) > 0 {
                ConnectionType::Bluetooth
            } else {
                ConnectionType::Usb
            }
        }
        _ => ConnectionType::Unknown,
    }
}

/// Read the controller serial number.
///
/// # Errors
///
/// `Transport`/`Open` when the device is gone, `Protocol` for malformed data.
pub fn read_serial(
    transport: &mut FeatureReportTransport,
    path: &str,
    settle: Duration,
) -> Result<String> {
    let response = exchange(transport, path, &SERIAL_REQUEST, settle, "serial number")?;
    let serial = decode_serial(&response)?;
    debug!("Read serial {} from {}", serial, path);
    Ok(serial)
}

/// Read the 28-byte calibration block.
///
/// # Errors
///
/// `Transport`/`Open` when the device is gone, `Protocol` for malformed data.
pub fn read_calibration(
    transport: &mut FeatureReportTransport,
    path: &str,
    settle: Duration,
) -> Result<CalibrationPayload> {
    let response = exchange(transport, path, &CALIBRATION_READ_REQUEST, settle, "calibration")?;
    let payload = extract_calibration(&response)?;
    debug!("Read calibration from {}: {}", path, payload);
    Ok(payload)
}

/// Write a calibration block.
///
/// Refused up front over Bluetooth, before any HID call is made.
///
/// # Errors
///
/// - `UnsupportedOperation` when `connection` is Bluetooth
/// - `Transport` if the controller does not accept the report
pub fn write_calibration(
    transport: &mut FeatureReportTransport,
    path: &str,
    connection: ConnectionType,
    payload: &CalibrationPayload,
) -> Result<()> {
    if !connection.allows_writes() {
        warn!("Refusing calibration write to {} over Bluetooth", path);
        return Err(DriftGuardError::UnsupportedOperation(
            BLUETOOTH_WRITE_REJECTED.to_string(),
        ));
    }

    let mut request = Vec::with_capacity(CALIBRATION_WRITE_PREFIX.len() + CALIBRATION_LEN);
    request.extend_from_slice(&CALIBRATION_WRITE_PREFIX);
    request.extend_from_slice(payload.as_bytes());

    if !transport.set_feature_report(path, REQUEST_REPORT_ID, &request_frame(&request)) {
        return Err(DriftGuardError::Transport {
            path: path.to_string(),
            reason: "calibration write was not accepted".to_string(),
        });
    }

    info!("Wrote calibration to {}", path);
    Ok(())
}

/// Detect whether the controller is attached over USB or Bluetooth.
///
/// Never fails: a missing response is `Unknown` and a transport failure is
/// `Error`.
pub fn probe_connection_type(transport: &mut FeatureReportTransport, path: &str) -> ConnectionType {
    match transport.get_feature_report(path, CONNECTION_REPORT_ID, REPORT_SIZE) {
        Ok(response) => classify_connection(response.as_deref()),
        Err(e) => {
            warn!("Connection-type probe failed on {}: {}", path, e);
            ConnectionType::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mocks::{SimDevice, SimulatedBus};
    use crate::hid::MockHidBackend;

    const PATH: &str = "/dev/hidraw0";

    fn setup(device: SimDevice) -> (SimulatedBus, FeatureReportTransport) {
        let bus = SimulatedBus::new();
        bus.add(device);
        let transport = FeatureReportTransport::new(bus.backend());
        (bus, transport)
    }

    fn response_with(bytes_at_4: &[u8]) -> Vec<u8> {
        let mut response = vec![0u8; 64];
        response[0] = 0x81;
        response[4..4 + bytes_at_4.len()].copy_from_slice(bytes_at_4);
        response
    }

    #[test]
    fn test_request_frame_is_padded() {
        let frame = request_frame(&SERIAL_REQUEST);
        assert_eq!(frame.len(), 63);
        assert_eq!(&frame[..3], &[0x01, 0x13, 0x01]);
        assert!(frame[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_serial_scenario() {
        let response = response_with(b"ABC");
        assert_eq!(decode_serial(&response).expect("decode"), "ABC");
    }

    #[test]
    fn test_decode_serial_uses_only_bytes_4_to_21() {
        let response = response_with(b"e8 47 a1 b2 c3 d4 XXXX");
        // 17 bytes: "e8 47 a1 b2 c3 d4" is exactly 17 characters
        assert_eq!(decode_serial(&response).expect("decode"), "E8 47 A1 B2 C3 D4");
    }

    #[test]
    fn test_decode_serial_drops_non_ascii() {
        let response = response_with(&[b'a', 0xFF, b'b', 0x80, b'c']);
        assert_eq!(decode_serial(&response).expect("decode"), "ABC");
    }

    #[test]
    fn test_decode_serial_failures() {
        assert!(matches!(decode_serial(&[]), Err(DriftGuardError::Protocol(_))));

        let mut wrong_id = response_with(b"ABC");
        wrong_id[0] = 0x83;
        assert!(matches!(decode_serial(&wrong_id), Err(DriftGuardError::Protocol(_))));

        let short = response_with(b"ABC")[..20].to_vec();
        assert!(matches!(decode_serial(&short), Err(DriftGuardError::Protocol(_))));

        let blank = response_with(b"");
        assert!(matches!(decode_serial(&blank), Err(DriftGuardError::Protocol(_))));
    }

    #[test]
    fn test_extract_calibration_slice() {
        let block: Vec<u8> = (100..128).collect();
        let payload = extract_calibration(&response_with(&block)).expect("extract");
        assert_eq!(payload.as_bytes().as_slice(), block.as_slice());
    }

    #[test]
    fn test_extract_calibration_requires_32_bytes() {
        let response = response_with(&[1u8; 28]);
        assert!(extract_calibration(&response[..32]).is_ok());

        let err = extract_calibration(&response[..31]).unwrap_err();
        assert!(matches!(err, DriftGuardError::Protocol(_)));
    }

    #[test]
    fn test_classify_short_response_is_unknown() {
        // Indexing 60/61 on these would panic if attempted
        assert_eq!(classify_connection(Some(&[0x83; 61])), ConnectionType::Unknown);
        assert_eq!(classify_connection(Some(&[0x83; 10])), ConnectionType::Unknown);
        assert_eq!(classify_connection(Some(&[])), ConnectionType::Unknown);
        assert_eq!(classify_connection(None), ConnectionType::Unknown);
    }

    #[test]
    fn test_classify_usb_and_bluetooth() {
        let mut response = vec![0u8; 64];
        response[0] = 0x83;
        assert_eq!(classify_connection(Some(&response)), ConnectionType::Usb);

        response[61] = 1;
        assert_eq!(classify_connection(Some(&response)), ConnectionType::Bluetooth);

        let mut exact = vec![0u8; 62];
        exact[60] = 0xFF;
        exact[61] = 0xFF;
        assert_eq!(classify_connection(Some(&exact)), ConnectionType::Bluetooth);
    }

    #[test]
    fn test_read_serial_from_simulated_device() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH).with_serial("  ab12cd34ef56  "));

        let serial = read_serial(&mut transport, PATH, Duration::ZERO).expect("serial");
        assert_eq!(serial, "AB12CD34EF56");

        let sent = bus.sent_reports(PATH);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 64);
        assert_eq!(&sent[0][..4], &[0x80, 0x01, 0x13, 0x01]);
    }

    #[test]
    fn test_usb_write_then_read_is_identical() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        let payload = CalibrationPayload::new(std::array::from_fn(|i| 200 - i as u8));

        write_calibration(&mut transport, PATH, ConnectionType::Usb, &payload).expect("write");
        let read_back = read_calibration(&mut transport, PATH, Duration::ZERO).expect("read");

        assert_eq!(read_back, payload);
        assert_eq!(&bus.calibration(PATH), payload.as_bytes());
    }

    #[test]
    fn test_write_frame_layout() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        let payload = CalibrationPayload::new([0xAB; 28]);

        write_calibration(&mut transport, PATH, ConnectionType::Unknown, &payload).expect("write");

        let sent = bus.sent_reports(PATH);
        let frame = &sent[0];
        assert_eq!(frame.len(), 64);
        assert_eq!(&frame[..3], &[0x80, 0x0C, 0x01]);
        assert!(frame[3..31].iter().all(|&b| b == 0xAB));
        assert!(frame[31..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bluetooth_write_makes_no_hid_calls() {
        let mut backend = MockHidBackend::new();
        backend.expect_open_path().times(0);
        backend.expect_enumerate().times(0);
        let mut transport = FeatureReportTransport::new(Box::new(backend));

        let err = write_calibration(
            &mut transport,
            PATH,
            ConnectionType::Bluetooth,
            &CalibrationPayload::new([0; 28]),
        )
        .unwrap_err();

        match err {
            DriftGuardError::UnsupportedOperation(msg) => assert_eq!(msg, BLUETOOTH_WRITE_REJECTED),
            other => panic!("Expected UnsupportedOperation, got: {:?}", other),
        }
    }

    #[test]
    fn test_read_calibration_short_response_fails() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        bus.set_override(PATH, 0x81, response_with(&[9u8; 28])[..31].to_vec());

        let err = read_calibration(&mut transport, PATH, Duration::ZERO).unwrap_err();
        assert!(matches!(err, DriftGuardError::Protocol(_)));
    }

    #[test]
    fn test_read_without_response_is_protocol_error() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        bus.set_override(PATH, 0x81, Vec::new());

        let err = read_serial(&mut transport, PATH, Duration::ZERO).unwrap_err();
        assert!(matches!(err, DriftGuardError::Protocol(_)));
    }

    #[test]
    fn test_read_on_unplugged_device_is_session_lost() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        bus.unplug(PATH);

        let err = read_calibration(&mut transport, PATH, Duration::ZERO).unwrap_err();
        assert!(err.is_session_lost());
    }

    #[test]
    fn test_probe_connection_type() {
        let (bus, mut transport) = setup(SimDevice::dualsense(PATH));
        assert_eq!(probe_connection_type(&mut transport, PATH), ConnectionType::Usb);

        bus.set_bluetooth(PATH, true);
        assert_eq!(probe_connection_type(&mut transport, PATH), ConnectionType::Bluetooth);

        bus.set_override(PATH, 0x83, vec![0x83; 40]);
        assert_eq!(probe_connection_type(&mut transport, PATH), ConnectionType::Unknown);

        bus.unplug(PATH);
        assert_eq!(probe_connection_type(&mut transport, PATH), ConnectionType::Error);
    }
}
