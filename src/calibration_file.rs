//! # Calibration File
//!
//! CSV export/import of a controller calibration.
//!
//! ## Format
//!
//! ```text
//! Serial Number,Controller Name,Calibration Data
//! E8475A1B2C3D4F5G6,Sony DualSense (PS5),"[12, 34, 0, ...]"
//! ```
//!
//! The header row is required but its contents are not checked. A legacy
//! two-column data row (serial, data) is accepted with controller name
//! `Unknown`.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::controller::CalibrationPayload;
use crate::error::{DriftGuardError, Result};

/// Header row written on save.
pub const HEADER: [&str; 3] = ["Serial Number", "Controller Name", "Calibration Data"];

/// Controller name used for legacy rows without one.
pub const UNKNOWN_CONTROLLER: &str = "Unknown";

/// One saved calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub serial: String,
    pub controller_name: String,
    pub payload: CalibrationPayload,
}

/// Split one CSV line into fields, honoring double-quoted fields with `""` escapes.
fn split_row(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DriftGuardError::CalibrationFile(
            "unterminated quoted field".to_string(),
        ));
    }
    fields.push(field);
    Ok(fields)
}

fn quote_field(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse calibration CSV text.
///
/// # Errors
///
/// Returns `CalibrationFile` if the header or data row is missing, the row
/// has fewer than two fields, or the data is not a list of exactly 28 values
/// in 0..=255.
///
/// # Examples
///
/// ```
/// use driftguard::calibration_file::parse;
///
/// let data = (0..28).map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
/// let text = format!("Serial Number,Calibration Data\nABC123,\"[{}]\"\n", data);
///
/// let record = parse(&text).unwrap();
/// assert_eq!(record.serial, "ABC123");
/// assert_eq!(record.controller_name, "Unknown");
/// ```
pub fn parse(text: &str) -> Result<CalibrationRecord> {
    let mut rows = text.lines().filter(|line| !line.trim().is_empty());

    rows.next()
        .ok_or_else(|| DriftGuardError::CalibrationFile("file is empty".to_string()))?;
    let row = rows
        .next()
        .ok_or_else(|| DriftGuardError::CalibrationFile("missing data row".to_string()))?;

    let fields = split_row(row)?;
    let (serial, controller_name, data) = match fields.as_slice() {
        [serial, name, data, ..] => (serial, name.clone(), data),
        [serial, data] => (serial, UNKNOWN_CONTROLLER.to_string(), data),
        _ => {
            return Err(DriftGuardError::CalibrationFile(
                "CSV file format is incorrect".to_string(),
            ))
        }
    };

    Ok(CalibrationRecord {
        serial: serial.trim().to_string(),
        controller_name: controller_name.trim().to_string(),
        payload: data.parse()?,
    })
}

/// Render a record as calibration CSV text (header plus one data row).
#[must_use]
pub fn render(record: &CalibrationRecord) -> String {
    let header = HEADER.join(",");
    let row = [
        quote_field(&record.serial),
        quote_field(&record.controller_name),
        quote_field(&record.payload.to_string()),
    ]
    .join(",");
    format!("{}\n{}\n", header, row)
}

/// Load a calibration CSV file.
///
/// # Errors
///
/// `Io` if the file cannot be read, `CalibrationFile` if it cannot be parsed.
pub fn load<P: AsRef<Path>>(path: P) -> Result<CalibrationRecord> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let record = parse(&text)?;
    info!(
        "Loaded calibration from {}: serial {}, controller {}",
        path.display(),
        record.serial,
        record.controller_name
    );
    debug!("Calibration data: {}", record.payload);
    Ok(record)
}

/// Save a calibration CSV file, replacing any existing file.
///
/// # Errors
///
/// `Io` if the file cannot be written.
pub fn save<P: AsRef<Path>>(path: P, record: &CalibrationRecord) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render(record))?;
    info!("Calibration saved to {}", path.display());
    Ok(())
}
