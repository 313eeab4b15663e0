//! # Error Types
//!
//! Custom error types for DriftGuard using `thiserror`.

use thiserror::Error;

/// Main error type for DriftGuard
#[derive(Debug, Error)]
pub enum DriftGuardError {
    /// HID path could not be opened (permissions, unplugged device)
    #[error("Failed to open HID device {path}: {reason}")]
    Open { path: String, reason: String },

    /// Read or write failure on an open handle, usually a disconnect
    #[error("HID transport error on {path}: {reason}")]
    Transport { path: String, reason: String },

    /// Malformed or short response from the controller
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation refused by policy for the current session
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No controller session is active
    #[error("Controller not connected")]
    NotConnected,

    /// No input-layer joystick corresponds to the HID controller
    #[error("No input joystick matches {0}")]
    JoystickNotFound(String),

    /// Caller passed an argument no device exchange can satisfy
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Calibration CSV could not be parsed
    #[error("Calibration file error: {0}")]
    CalibrationFile(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Settings file errors
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriftGuardError {
    /// Whether this failure means the device is gone and the session should be torn down.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Transport { .. })
    }
}

/// Result type alias for DriftGuard
pub type Result<T> = std::result::Result<T, DriftGuardError>;
