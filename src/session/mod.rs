//! # Session Module
//!
//! Controller session lifecycle.
//!
//! [`manager::SessionManager`] is a synchronous state machine advanced one
//! tick at a time; [`runner::PollingLoop`] drives it at a fixed rate on a
//! background task and publishes a [`SessionSnapshot`] after every tick.
//!
//! ```text
//!            discovery match            open + joystick ok
//! Searching ─────────────────► Connecting ─────────────────► Connected
//!     ▲                            │ failure                     │ read error /
//!     │                            ▼                             │ failed probe
//!     └──────────────────────── Searching ◄─── Disconnecting ◄───┘
//! ```

pub mod manager;
pub mod runner;

pub use manager::{SessionManager, SessionSettings};
pub use runner::PollingLoop;

use std::fmt;

use crate::controller::{AxisValues, ConnectionType, ControllerIdentity};

/// Session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Searching,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Searching => "Searching",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        };
        f.write_str(label)
    }
}

/// Immutable view of the session published after each tick.
///
/// `identity` is set only while connected and `axes` is neutral otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub identity: Option<ControllerIdentity>,
    pub connection: ConnectionType,
    pub axes: AxisValues,
    /// Number of ticks completed when the snapshot was taken.
    pub tick: u64,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.identity.is_some()
    }

    /// Human-readable controller status, e.g. `Sony DualSense (PS5) (USB)` or `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use driftguard::session::SessionSnapshot;
    ///
    /// assert_eq!(SessionSnapshot::default().status_line(), "None");
    /// ```
    #[must_use]
    pub fn status_line(&self) -> String {
        match (&self.identity, self.state) {
            (Some(identity), SessionState::Connected) => {
                format!("{} ({})", identity.display_name, self.connection)
            }
            _ => "None".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(connection: ConnectionType) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Connected,
            identity: Some(ControllerIdentity {
                vendor_id: 0x054C,
                product_id: 0x0CE6,
                display_name: "Sony DualSense (PS5)".to_string(),
                path: "/dev/hidraw0".to_string(),
            }),
            connection,
            axes: AxisValues::NEUTRAL,
            tick: 1,
        }
    }

    #[test]
    fn test_status_line_variants() {
        assert_eq!(connected(ConnectionType::Usb).status_line(), "Sony DualSense (PS5) (USB)");
        assert_eq!(connected(ConnectionType::Bluetooth).status_line(), "Sony DualSense (PS5) (BT)");
        assert_eq!(connected(ConnectionType::Unknown).status_line(), "Sony DualSense (PS5) (Unknown)");
    }

    #[test]
    fn test_default_snapshot_is_searching() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, SessionState::Searching);
        assert!(!snapshot.is_connected());
        assert!(snapshot.axes.is_neutral());
        assert_eq!(snapshot.status_line(), "None");
    }

    #[test]
    fn test_identity_without_connected_state_is_not_connected() {
        let mut snapshot = connected(ConnectionType::Usb);
        snapshot.state = SessionState::Disconnecting;
        assert!(!snapshot.is_connected());
        assert_eq!(snapshot.status_line(), "None");
    }
}
