//! # Session Manager
//!
//! One controller session at a time, advanced by [`SessionManager::tick`].
//!
//! ## Tick Behavior
//!
//! - **Searching**: runs discovery, at most once per discovery interval.
//!   A match moves to Connecting; the connection attempt happens next tick.
//! - **Connecting**: opens the HID path, probes the connection type and opens
//!   the matching joystick. Any failure closes the path and returns to
//!   Searching.
//! - **Connected**: samples axes every tick and runs the health probe at the
//!   health-check interval. A read error or failed probe disconnects.
//! - **Disconnecting**: closes the HID handle, releases the joystick and zeroes
//!   the axes, then returns to Searching in the same tick.
//!
//! Session loss is the only recovery mechanism. There is no backoff beyond the
//! discovery throttle.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::controller::discovery::find_supported_controller;
use crate::controller::protocol::probe_connection_type;
use crate::controller::{
    AxisReader, AxisValues, ConnectionType, ControllerIdentity, JoystickMatcher, JoystickProvider,
    SupportedDevices,
};
use crate::error::{DriftGuardError, Result};
use crate::hid::{self, is_responsive, ProbeMode, ProbeSettings, SharedTransport};

use super::{SessionSnapshot, SessionState};

/// Timing and probing parameters for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Minimum time between two discovery scans.
    pub discovery_interval: Duration,
    /// Minimum time between two health probes of the active session.
    pub health_check_interval: Duration,
    /// Probe used to filter ghost devices during discovery.
    pub discovery_probe: ProbeSettings,
    /// Probe used to validate the active session.
    pub health_probe: ProbeSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_millis(2000),
            health_check_interval: Duration::from_millis(250),
            discovery_probe: ProbeSettings::new(3, Duration::from_millis(50)),
            health_probe: ProbeSettings::new(4, Duration::from_millis(4)),
        }
    }
}

/// Monotonic rate limiter for discovery scans.
#[derive(Debug, Clone)]
pub struct DiscoveryThrottle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl DiscoveryThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// Returns `true` and records `now` if a scan is allowed at `now`.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let ready = self
            .last_run
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last_run = Some(now);
        }
        ready
    }
}

struct ActiveSession {
    identity: ControllerIdentity,
    connection: ConnectionType,
    reader: Box<dyn AxisReader>,
    last_health_check: Instant,
}

/// Controller session state machine.
pub struct SessionManager {
    transport: SharedTransport,
    joysticks: Box<dyn JoystickProvider>,
    matcher: JoystickMatcher,
    supported: SupportedDevices,
    settings: SessionSettings,
    throttle: DiscoveryThrottle,
    state: SessionState,
    candidate: Option<ControllerIdentity>,
    session: Option<ActiveSession>,
    axes: AxisValues,
    ticks: u64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state)
            .field("candidate", &self.candidate)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        transport: SharedTransport,
        joysticks: Box<dyn JoystickProvider>,
        matcher: JoystickMatcher,
        supported: SupportedDevices,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            joysticks,
            matcher,
            supported,
            throttle: DiscoveryThrottle::new(settings.discovery_interval),
            settings,
            state: SessionState::Searching,
            candidate: None,
            session: None,
            axes: AxisValues::NEUTRAL,
            ticks: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the state machine by one tick and return the resulting snapshot.
    pub fn tick(&mut self, now: Instant) -> SessionSnapshot {
        match self.state {
            SessionState::Searching => self.search(now),
            SessionState::Connecting => self.connect(now),
            SessionState::Connected => self.poll(now),
            SessionState::Disconnecting => self.disconnect(),
        }
        self.ticks += 1;
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.session {
            Some(session) if self.state == SessionState::Connected => SessionSnapshot {
                state: self.state,
                identity: Some(session.identity.clone()),
                connection: session.connection,
                axes: self.axes,
                tick: self.ticks,
            },
            _ => SessionSnapshot {
                state: self.state,
                identity: None,
                connection: ConnectionType::Unknown,
                axes: AxisValues::NEUTRAL,
                tick: self.ticks,
            },
        }
    }

    /// Tear down any session and close every cached HID handle.
    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            self.disconnect();
        }
        self.candidate = None;
        self.state = SessionState::Searching;
        hid::lock(&self.transport).cache_mut().close_all();
    }

    fn search(&mut self, now: Instant) {
        if !self.throttle.try_acquire(now) {
            return;
        }

        let found = {
            let mut transport = hid::lock(&self.transport);
            find_supported_controller(&mut transport, &self.supported, self.settings.discovery_probe)
        };

        match found {
            Some(identity) => {
                debug!("Discovered {} at {}", identity.display_name, identity.path);
                self.candidate = Some(identity);
                self.state = SessionState::Connecting;
            }
            None => debug!("No supported controller found"),
        }
    }

    fn connect(&mut self, now: Instant) {
        let Some(identity) = self.candidate.take() else {
            self.state = SessionState::Searching;
            return;
        };

        match self.open_session(&identity, now) {
            Ok(session) => {
                info!(
                    "Controller connected: {} ({}) via {}",
                    session.identity.display_name,
                    session.connection,
                    session.reader.name()
                );
                self.session = Some(session);
                self.state = SessionState::Connected;
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", identity.display_name, e);
                hid::lock(&self.transport).cache_mut().close(&identity.path);
                self.state = SessionState::Searching;
            }
        }
    }

    fn open_session(&mut self, identity: &ControllerIdentity, now: Instant) -> Result<ActiveSession> {
        let connection = {
            let mut transport = hid::lock(&self.transport);
            transport.cache_mut().open(&identity.path)?;
            probe_connection_type(&mut transport, &identity.path)
        };

        let joysticks = self.joysticks.joysticks()?;
        let joystick = self
            .matcher
            .select(identity, &joysticks)
            .ok_or_else(|| DriftGuardError::JoystickNotFound(identity.display_name.clone()))?;
        let reader = self.joysticks.open(joystick)?;

        Ok(ActiveSession {
            identity: identity.clone(),
            connection,
            reader,
            last_health_check: now,
        })
    }

    fn poll(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            self.state = SessionState::Searching;
            return;
        };

        match session.reader.sample() {
            Ok(axes) => self.axes = axes,
            Err(e) => {
                warn!("Joystick read failed: {}", e);
                self.state = SessionState::Disconnecting;
                self.disconnect();
                return;
            }
        }

        if now.saturating_duration_since(session.last_health_check) < self.settings.health_check_interval {
            return;
        }
        session.last_health_check = now;

        let alive = {
            let mut transport = hid::lock(&self.transport);
            is_responsive(
                &mut transport,
                &session.identity.path,
                self.settings.health_probe,
                ProbeMode::Cached,
            )
        };
        if !alive {
            warn!("{} stopped responding", session.identity.display_name);
            self.state = SessionState::Disconnecting;
            self.disconnect();
        }
    }

    /// Disconnecting: release everything and return to Searching.
    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            hid::lock(&self.transport).cache_mut().close(&session.identity.path);
            info!("Controller disconnected: {}", session.identity.display_name);
            // Dropping the session releases the joystick
        }
        self.axes = AxisValues::NEUTRAL;
        self.state = SessionState::Searching;
    }
}
