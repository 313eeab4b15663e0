//! # Calibration Payload
//!
//! The 28-byte stick calibration block stored on the controller.
//!
//! The content is opaque: only its position in the 0x81 response (bytes
//! 4..32) and its length are meaningful. The payload is moved between the
//! controller and calibration files unchanged.
//!
//! ## Text Form
//!
//! Calibration files store the payload as a bracketed integer list:
//!
//! ```
//! use driftguard::controller::calibration::CalibrationPayload;
//!
//! let payload: CalibrationPayload = "[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, \
//!     15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28]".parse().unwrap();
//! assert_eq!(payload.as_bytes()[0], 1);
//! assert!(payload.to_string().starts_with("[1, 2, 3"));
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{DriftGuardError, Result};

/// Number of bytes in a calibration payload.
pub const CALIBRATION_LEN: usize = 28;

/// Opaque stick calibration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalibrationPayload([u8; CALIBRATION_LEN]);

impl CalibrationPayload {
    #[must_use]
    pub fn new(bytes: [u8; CALIBRATION_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a payload from exactly [`CALIBRATION_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for any other length. Short payloads are never padded.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; CALIBRATION_LEN] = bytes.try_into().map_err(|_| {
            DriftGuardError::InvalidArgument(format!(
                "calibration payload must be {} bytes, got {}",
                CALIBRATION_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Build a payload from integers, each of which must fit in a byte.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the count is not [`CALIBRATION_LEN`] or a
    /// value falls outside 0..=255.
    pub fn from_values(values: &[i64]) -> Result<Self> {
        if values.len() != CALIBRATION_LEN {
            return Err(DriftGuardError::InvalidArgument(format!(
                "calibration data must have {} values, got {}",
                CALIBRATION_LEN,
                values.len()
            )));
        }

        let mut bytes = [0u8; CALIBRATION_LEN];
        for (i, (slot, &value)) in bytes.iter_mut().zip(values).enumerate() {
            *slot = u8::try_from(value).map_err(|_| {
                DriftGuardError::InvalidArgument(format!(
                    "calibration value {} at index {} is outside 0..=255",
                    value, i
                ))
            })?;
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CALIBRATION_LEN] {
        &self.0
    }
}

impl fmt::Display for CalibrationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", byte)?;
        }
        f.write_str("]")
    }
}

impl FromStr for CalibrationPayload {
    type Err = DriftGuardError;

    /// Parse `[a, b, ...]`. Brackets and surrounding whitespace are optional.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);

        let values = inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<i64>().map_err(|_| {
                    DriftGuardError::CalibrationFile(format!("not an integer: {:?}", item))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_values(&values).map_err(|e| match e {
            DriftGuardError::InvalidArgument(msg) => DriftGuardError::CalibrationFile(msg),
            other => other,
        })
    }
}
