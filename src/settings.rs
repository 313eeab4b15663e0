//! # Application Settings
//!
//! User preferences persisted as JSON next to the configuration.
//!
//! ```json
//! {
//!   "autoload_calibration": true,
//!   "startup_calibration_file": "startup_calibration.csv"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

fn default_startup_calibration_file() -> String { "startup_calibration.csv".to_string() }

/// Persisted user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Apply the startup calibration file when a controller first connects
    #[serde(default)]
    pub autoload_calibration: bool,

    #[serde(default = "default_startup_calibration_file")]
    pub startup_calibration_file: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autoload_calibration: false,
            startup_calibration_file: default_startup_calibration_file(),
        }
    }
}

impl AppSettings {
    /// Load settings from `path`.
    ///
    /// A missing file yields the defaults. A file that cannot be read or
    /// parsed is logged and also yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(crate::error::DriftGuardError::from)
            .and_then(|text| Ok(serde_json::from_str::<Self>(&text)?));

        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write settings to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// `Settings` if serialization fails, `Io` if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }
}
