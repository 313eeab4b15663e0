//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below, and a missing file yields the built-in configuration.
//!
//! ```toml
//! [polling]
//! tick_rate_hz = 120
//! discovery_interval_ms = 2000
//! health_check_interval_ms = 250
//! shutdown_timeout_ms = 2000
//!
//! [hid]
//! settle_delay_ms = 20
//! probe_tries = 3
//! probe_delay_ms = 50
//! health_probe_tries = 4
//! health_probe_delay_ms = 4
//!
//! [[devices.supported]]
//! vendor_id = 0x054C
//! product_id = 0x0E5F
//! name = "Sony DualSense (prototype)"
//!
//! [matching]
//! name_patterns = ["DualSense", "Wireless Controller"]
//!
//! [logging]
//! log_dir = "./logs"
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::controller::{JoystickMatcher, SupportedDevice, SupportedDevices};
use crate::error::{DriftGuardError, Result};
use crate::hid::ProbeSettings;
use crate::session::SessionSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub hid: HidConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Polling loop timing
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,

    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// HID exchange timing
#[derive(Debug, Deserialize, Clone)]
pub struct HidConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_probe_tries")]
    pub probe_tries: u32,

    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    #[serde(default = "default_health_probe_tries")]
    pub health_probe_tries: u32,

    #[serde(default = "default_health_probe_delay_ms")]
    pub health_probe_delay_ms: u64,
}

/// Extra allow-list entries
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DevicesConfig {
    #[serde(default)]
    pub supported: Vec<SupportedDevice>,
}

/// Joystick matching policy
#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_name_patterns")]
    pub name_patterns: Vec<String>,
}

/// Activity log
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Default value functions
fn default_tick_rate_hz() -> u32 { 120 }
fn default_discovery_interval_ms() -> u64 { 2000 }
fn default_health_check_interval_ms() -> u64 { 250 }
fn default_shutdown_timeout_ms() -> u64 { 2000 }

fn default_settle_delay_ms() -> u64 { 20 }
fn default_probe_tries() -> u32 { 3 }
fn default_probe_delay_ms() -> u64 { 50 }
fn default_health_probe_tries() -> u32 { 4 }
fn default_health_probe_delay_ms() -> u64 { 4 }

fn default_name_patterns() -> Vec<String> {
    vec!["DualSense".to_string(), "Wireless Controller".to_string()]
}

fn default_log_dir() -> String { "./logs".to_string() }

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            discovery_interval_ms: default_discovery_interval_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            probe_tries: default_probe_tries(),
            probe_delay_ms: default_probe_delay_ms(),
            health_probe_tries: default_health_probe_tries(),
            health_probe_delay_ms: default_health_probe_delay_ms(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            name_patterns: default_name_patterns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> DriftGuardError {
    DriftGuardError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use driftguard::config::Config;
    ///
    /// let config = Config::load("driftguard.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the built-in defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`] when the file exists.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.polling.tick_rate_hz == 0 || self.polling.tick_rate_hz > 1000 {
            return Err(invalid("tick_rate_hz must be between 1 and 1000"));
        }

        if self.polling.discovery_interval_ms < 100 || self.polling.discovery_interval_ms > 60000 {
            return Err(invalid("discovery_interval_ms must be between 100 and 60000"));
        }

        if self.polling.health_check_interval_ms == 0 || self.polling.health_check_interval_ms > 60000 {
            return Err(invalid("health_check_interval_ms must be between 1 and 60000"));
        }

        if self.polling.shutdown_timeout_ms == 0 || self.polling.shutdown_timeout_ms > 60000 {
            return Err(invalid("shutdown_timeout_ms must be between 1 and 60000"));
        }

        if self.hid.settle_delay_ms > 1000 {
            return Err(invalid("settle_delay_ms must be at most 1000"));
        }

        for (name, tries) in [
            ("probe_tries", self.hid.probe_tries),
            ("health_probe_tries", self.hid.health_probe_tries),
        ] {
            if tries == 0 || tries > 20 {
                return Err(invalid(format!("{} must be between 1 and 20", name)));
            }
        }

        if self.hid.probe_delay_ms > 1000 {
            return Err(invalid("probe_delay_ms must be at most 1000"));
        }

        // The health probe runs inside a tick and must stay short
        if self.hid.health_probe_delay_ms > 100 {
            return Err(invalid("health_probe_delay_ms must be at most 100"));
        }

        for device in &self.devices.supported {
            if device.name.trim().is_empty() {
                return Err(invalid(format!(
                    "supported device 0x{:04X}:0x{:04X} needs a name",
                    device.vendor_id, device.product_id
                )));
            }
        }

        if self.matching.name_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("name_patterns cannot contain empty patterns"));
        }

        if self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        Ok(())
    }

    /// Polling loop period derived from `tick_rate_hz`.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.polling.tick_rate_hz.max(1)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.shutdown_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.hid.settle_delay_ms)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            discovery_interval: Duration::from_millis(self.polling.discovery_interval_ms),
            health_check_interval: Duration::from_millis(self.polling.health_check_interval_ms),
            discovery_probe: ProbeSettings::new(
                self.hid.probe_tries,
                Duration::from_millis(self.hid.probe_delay_ms),
            ),
            health_probe: ProbeSettings::new(
                self.hid.health_probe_tries,
                Duration::from_millis(self.hid.health_probe_delay_ms),
            ),
        }
    }

    /// Built-in allow-list plus `[devices]` entries.
    pub fn supported_devices(&self) -> SupportedDevices {
        SupportedDevices::with_extra(self.devices.supported.iter().cloned())
    }

    pub fn joystick_matcher(&self) -> JoystickMatcher {
        JoystickMatcher::from_patterns(&self.matching.name_patterns)
    }
}
