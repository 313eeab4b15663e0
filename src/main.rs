//! # DriftGuard
//!
//! Back up and restore DualSense analog-stick calibration over USB HID.
//!
//! The `monitor` command keeps a controller session alive and logs its status;
//! `save` and `load` move a calibration between the controller and a CSV file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use driftguard::calibration_file;
use driftguard::config::Config;
use driftguard::controller::discovery::list_responsive_gamepads;
use driftguard::controller::ps5::EvdevJoysticks;
use driftguard::hid::{self, FeatureReportTransport, HidApiBackend, SharedTransport};
use driftguard::service::CalibrationService;
use driftguard::session::{PollingLoop, SessionManager, SessionSnapshot};
use driftguard::settings::AppSettings;

/// How long `save` and `load` wait for a controller to connect
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Period between monitor status log lines
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Period of the monitor's connection watch
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "driftguard")]
#[command(about = "Back up and restore DualSense stick calibration")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "driftguard.toml")]
    config: PathBuf,

    /// Settings file (JSON)
    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep a controller session open and log its status until Ctrl+C
    Monitor,

    /// List responsive gamepads once
    List,

    /// Read the connected controller's calibration into a CSV file
    Save {
        file: PathBuf,
    },

    /// Apply a calibration CSV file to the connected controller
    Load {
        file: PathBuf,
    },

    /// Show or update startup settings
    Settings {
        /// Apply the startup calibration when a controller first connects
        #[arg(long)]
        autoload: Option<bool>,

        /// Calibration file applied at startup
        #[arg(long)]
        startup_file: Option<String>,
    },
}

fn log_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Console output plus the daily activity log under `log_dir`.
///
/// The returned guard flushes the activity log and must be held until exit.
fn init_logging(verbose: u8, log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("driftguard")
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to open activity log")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Running polling loop plus the calibration service bound to it.
struct Session {
    polling: PollingLoop,
    service: CalibrationService,
}

impl Session {
    fn start(config: &Config) -> Result<Self> {
        let transport = open_transport()?;
        let manager = SessionManager::new(
            transport.clone(),
            Box::new(EvdevJoysticks::default()),
            config.joystick_matcher(),
            config.supported_devices(),
            config.session_settings(),
        );
        let polling = PollingLoop::spawn(
            manager,
            transport.clone(),
            config.tick_period(),
            config.shutdown_timeout(),
        );
        let service = CalibrationService::new(transport, polling.subscribe(), config.settle_delay());
        Ok(Self { polling, service })
    }

    async fn wait_for_controller(&self) -> Result<SessionSnapshot> {
        info!("Waiting for a controller...");
        let snapshot = self
            .polling
            .wait_for_connection(CONNECT_TIMEOUT)
            .await
            .context("No supported controller connected")?;
        info!("Controller: {}", snapshot.status_line());
        Ok(snapshot)
    }
}

fn open_transport() -> Result<SharedTransport> {
    let backend = HidApiBackend::new().context("Failed to initialize HID backend")?;
    Ok(hid::share(FeatureReportTransport::new(Box::new(backend))))
}

/// Main entry point for DriftGuard
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse the command line
///    - Load configuration (defaults if the file is missing) and settings
///    - Set up console and activity-log output
///
/// 2. **Command**
///    - `monitor`: run the polling loop until Ctrl+C, autoloading the
///      startup calibration on first connection when enabled
///    - `list`: one discovery pass
///    - `save` / `load`: wait for a session, then read or apply a calibration
///    - `settings`: show or update the settings file
///
/// 3. **Shutdown**
///    - Stop the polling loop and release every HID handle
///
/// # Errors
///
/// Returns error if:
/// - Configuration is invalid
/// - The HID backend cannot be initialized
/// - No controller connects in time for `save` / `load`
/// - The calibration exchange or CSV file fails
///
/// # Examples
///
/// ```bash
/// driftguard save backup.csv
/// driftguard load backup.csv
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let _guard = init_logging(cli.verbose, Path::new(&config.logging.log_dir))?;

    info!("DriftGuard v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Monitor => monitor(&config, &AppSettings::load(&cli.settings)).await,
        Commands::List => list(&config).await,
        Commands::Save { file } => save(&config, &file).await,
        Commands::Load { file } => load(&config, &file).await,
        Commands::Settings {
            autoload,
            startup_file,
        } => update_settings(&cli.settings, autoload, startup_file),
    }
}

async fn monitor(config: &Config, settings: &AppSettings) -> Result<()> {
    let session = Session::start(config)?;

    let mut status_interval = interval(STATUS_LOG_INTERVAL);
    let mut watch_interval = interval(WATCH_INTERVAL);
    let mut autoload_pending = settings.autoload_calibration;
    let mut last_status = String::new();

    info!("Monitoring at {}Hz, press Ctrl+C to exit", config.polling.tick_rate_hz);

    loop {
        tokio::select! {
            _ = watch_interval.tick() => {
                let snapshot = session.polling.latest();
                let status = snapshot.status_line();
                if status != last_status {
                    info!("Controller: {}", status);
                    last_status = status;
                }

                if autoload_pending && snapshot.is_connected() {
                    autoload_pending = false;
                    autoload(&session.service, &settings.startup_calibration_file).await;
                }
            }

            _ = status_interval.tick() => {
                let snapshot = session.polling.latest();
                let axes = snapshot.axes;
                info!(
                    "[{}] {} | L ({:+.2}, {:+.2}) R ({:+.2}, {:+.2}) L2 {:.2} R2 {:.2}",
                    snapshot.state,
                    snapshot.status_line(),
                    axes.left_x,
                    axes.left_y,
                    axes.right_x,
                    axes.right_y,
                    axes.left_trigger,
                    axes.right_trigger
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.polling.stop().await;
    Ok(())
}

/// Apply the startup calibration file. Failures are logged only.
async fn autoload(service: &CalibrationService, file: &str) {
    if !Path::new(file).exists() {
        warn!("Startup calibration file {} not found", file);
        return;
    }

    let record = match calibration_file::load(file) {
        Ok(record) => record,
        Err(e) => {
            warn!("Startup calibration not loaded: {}", e);
            return;
        }
    };

    match service.apply_calibration(record.payload).await {
        Ok(()) => info!("Startup calibration from {} applied", file),
        Err(e) => warn!("Startup calibration not applied: {}", e),
    }
}

async fn list(config: &Config) -> Result<()> {
    let transport = open_transport()?;
    let probe = config.session_settings().discovery_probe;
    let supported = config.supported_devices();

    let gamepads = tokio::task::spawn_blocking(move || {
        let mut transport = hid::lock(&transport);
        let found = list_responsive_gamepads(&mut transport, probe);
        transport.cache_mut().close_all();
        found
    })
    .await??;

    if gamepads.is_empty() {
        info!("No responsive gamepads found");
    }
    for info in gamepads {
        let name = supported
            .lookup(info.vendor_id, info.product_id)
            .map(|device| device.name.clone())
            .or(info.product_string)
            .unwrap_or_else(|| "Unknown gamepad".to_string());
        info!(
            "0x{:04X}:0x{:04X} {} at {}",
            info.vendor_id, info.product_id, name, info.path
        );
    }

    Ok(())
}

async fn save(config: &Config, file: &Path) -> Result<()> {
    let session = Session::start(config)?;

    let result = async {
        session.wait_for_controller().await?;
        let record = session.service.read_calibration().await?;
        calibration_file::save(file, &record)?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    session.polling.stop().await;
    result
}

async fn load(config: &Config, file: &Path) -> Result<()> {
    let record = calibration_file::load(file)
        .with_context(|| format!("Failed to read calibration from {}", file.display()))?;
    let session = Session::start(config)?;

    let result = async {
        let snapshot = session.wait_for_controller().await?;
        if let Some(identity) = &snapshot.identity {
            if identity.display_name != record.controller_name {
                info!(
                    "Calibration was saved from {}, applying to {}",
                    record.controller_name, identity.display_name
                );
            }
        }
        session.service.apply_calibration(record.payload).await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    session.polling.stop().await;
    result
}

fn update_settings(path: &Path, autoload: Option<bool>, startup_file: Option<String>) -> Result<()> {
    let mut settings = AppSettings::load(path);
    let changed = autoload.is_some() || startup_file.is_some();

    if let Some(autoload) = autoload {
        settings.autoload_calibration = autoload;
    }
    if let Some(startup_file) = startup_file {
        settings.startup_calibration_file = startup_file;
    }
    if changed {
        settings.save(path)?;
    }

    info!("Autoload calibration: {}", settings.autoload_calibration);
    info!("Startup calibration file: {}", settings.startup_calibration_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["driftguard", "monitor"])?;
        assert_eq!(cli.config, PathBuf::from("driftguard.toml"));
        assert_eq!(cli.settings, PathBuf::from("settings.json"));
        assert_eq!(cli.verbose, 0);
        assert!(matches!(cli.command, Commands::Monitor));
        Ok(())
    }

    #[test]
    fn test_parse_save_and_load() -> TestResult {
        let cli = Cli::try_parse_from(["driftguard", "save", "backup.csv"])?;
        assert!(matches!(cli.command, Commands::Save { file } if file == PathBuf::from("backup.csv")));

        let cli = Cli::try_parse_from(["driftguard", "load", "backup.csv", "--config", "alt.toml"])?;
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Commands::Load { .. }));
        Ok(())
    }

    #[test]
    fn test_parse_settings_flags() -> TestResult {
        let cli = Cli::try_parse_from([
            "driftguard",
            "settings",
            "--autoload",
            "true",
            "--startup-file",
            "pad.csv",
        ])?;
        match cli.command {
            Commands::Settings {
                autoload,
                startup_file,
            } => {
                assert_eq!(autoload, Some(true));
                assert_eq!(startup_file.as_deref(), Some("pad.csv"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_save_requires_file() {
        assert!(Cli::try_parse_from(["driftguard", "save"]).is_err());
    }

    #[test]
    fn test_verbose_levels() -> TestResult {
        let cli = Cli::try_parse_from(["driftguard", "-vv", "list"])?;
        assert_eq!(cli.verbose, 2);
        assert_eq!(log_level(0), tracing::Level::INFO);
        assert_eq!(log_level(1), tracing::Level::DEBUG);
        assert_eq!(log_level(cli.verbose), tracing::Level::TRACE);
        Ok(())
    }

    #[test]
    fn test_update_settings_persists_changes() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        update_settings(&path, Some(true), None)?;
        let saved = AppSettings::load(&path);
        assert!(saved.autoload_calibration);
        assert_eq!(saved.startup_calibration_file, "startup_calibration.csv");
        Ok(())
    }

    #[test]
    fn test_show_settings_does_not_write() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        update_settings(&path, None, None)?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_timing_constants() {
        assert!(WATCH_INTERVAL < STATUS_LOG_INTERVAL);
        assert_eq!(CONNECT_TIMEOUT, Duration::from_secs(10));
    }
}
