//! # Controller Discovery
//!
//! Finds the HID interface of a supported controller.
//!
//! Discovery is a two-stage filter:
//!
//! 1. Enumerate and keep Generic Desktop (0x01) Joystick/Gamepad collections,
//!    then drop candidates that do not answer a short responsiveness probe.
//!    Enumeration keeps stale "ghost" entries for recently unplugged devices.
//! 2. Match the survivors against the supported (vendor, product) allow-list.
//!    The first match wins.

use tracing::{debug, info, warn};

use super::identity::{ControllerIdentity, SupportedDevices};
use crate::error::Result;
use crate::hid::{is_responsive, FeatureReportTransport, HidDeviceInfo, ProbeMode, ProbeSettings};

/// HID usage page: Generic Desktop Controls
pub const GENERIC_DESKTOP_USAGE_PAGE: u16 = 0x01;

/// HID usage: Joystick
pub const JOYSTICK_USAGE: u16 = 0x04;

/// HID usage: Gamepad
pub const GAMEPAD_USAGE: u16 = 0x05;

/// Whether `info` describes a joystick or gamepad top-level collection.
#[must_use]
pub fn is_gamepad_interface(info: &HidDeviceInfo) -> bool {
    info.usage_page == GENERIC_DESKTOP_USAGE_PAGE
        && (info.usage == JOYSTICK_USAGE || info.usage == GAMEPAD_USAGE)
}

/// Enumerate joystick/gamepad interfaces that answer a responsiveness probe.
///
/// # Errors
///
/// Returns `Transport` if HID enumeration itself fails.
pub fn list_responsive_gamepads(
    transport: &mut FeatureReportTransport,
    probe: ProbeSettings,
) -> Result<Vec<HidDeviceInfo>> {
    let devices = transport.enumerate()?;

    let mut responsive = Vec::new();
    for info in devices.into_iter().filter(is_gamepad_interface) {
        if is_responsive(transport, &info.path, probe, ProbeMode::Scoped) {
            debug!(
                "Responsive gamepad 0x{:04X}:0x{:04X} at {}",
                info.vendor_id, info.product_id, info.path
            );
            responsive.push(info);
        } else {
            debug!("Skipping unresponsive interface at {}", info.path);
        }
    }

    Ok(responsive)
}

/// Find the first responsive interface of a supported controller.
///
/// Enumeration failures are logged and reported as "no controller".
///
/// # Examples
///
/// ```no_run
/// use driftguard::controller::discovery::find_supported_controller;
/// use driftguard::controller::identity::SupportedDevices;
/// use driftguard::hid::{FeatureReportTransport, HidApiBackend, ProbeSettings};
///
/// let mut transport = FeatureReportTransport::new(Box::new(HidApiBackend::new()?));
/// let supported = SupportedDevices::default();
/// if let Some(controller) = find_supported_controller(&mut transport, &supported, ProbeSettings::default()) {
///     println!("Found {} at {}", controller.display_name, controller.path);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn find_supported_controller(
    transport: &mut FeatureReportTransport,
    supported: &SupportedDevices,
    probe: ProbeSettings,
) -> Option<ControllerIdentity> {
    let candidates = match list_responsive_gamepads(transport, probe) {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("HID enumeration failed: {}", e);
            return None;
        }
    };

    let identity = candidates.into_iter().find_map(|info| {
        supported
            .lookup(info.vendor_id, info.product_id)
            .map(|device| ControllerIdentity {
                vendor_id: info.vendor_id,
                product_id: info.product_id,
                display_name: device.name.clone(),
                path: info.path,
            })
    });

    if let Some(identity) = &identity {
        info!("Found {} at {}", identity.display_name, identity.path);
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::identity::SupportedDevice;
    use crate::hid::mocks::{SimDevice, SimulatedBus};
    use crate::hid::{HidIoError, MockHidBackend};
    use std::time::Duration;

    fn fast() -> ProbeSettings {
        ProbeSettings::new(2, Duration::ZERO)
    }

    fn transport(bus: &SimulatedBus) -> FeatureReportTransport {
        FeatureReportTransport::new(bus.backend())
    }

    #[test]
    fn test_finds_supported_responsive_controller() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::dualsense("/dev/hidraw0"));

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast())
            .expect("controller should be found");

        assert_eq!(found.display_name, "Sony DualSense (PS5)");
        assert_eq!(found.path, "/dev/hidraw0");
        assert_eq!(found.vendor_id, 0x054C);
        assert_eq!(found.product_id, 0x0CE6);
    }

    #[test]
    fn test_finds_edge() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::dualsense_edge("/dev/hidraw2"));

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast())
            .expect("edge should be found");
        assert_eq!(found.display_name, "Sony DualSense Edge");
    }

    #[test]
    fn test_ghost_device_is_not_matched() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::dualsense("/dev/hidraw0").unresponsive());

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast());
        assert!(found.is_none(), "Allow-listed but unresponsive must not match");
    }

    #[test]
    fn test_unsupported_responsive_device_is_not_matched() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::other("/dev/hidraw0", 0x045E, 0x0B13, 0x01, 0x05));

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast());
        assert!(found.is_none(), "Responsive but not allow-listed must not match");
    }

    #[test]
    fn test_every_allow_listed_pair_needs_both_conditions() {
        let supported = SupportedDevices::default();
        for device in supported.iter() {
            let path = "/dev/hidraw0";
            let live = SimDevice::other(path, device.vendor_id, device.product_id, 0x01, 0x05);

            let bus = SimulatedBus::new();
            bus.add(live.clone());
            assert!(find_supported_controller(&mut transport(&bus), &supported, fast()).is_some());

            let bus = SimulatedBus::new();
            bus.add(live.unresponsive());
            assert!(find_supported_controller(&mut transport(&bus), &supported, fast()).is_none());
        }
    }

    #[test]
    fn test_non_gamepad_usage_is_skipped() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::other("/dev/hidraw0", 0x054C, 0x0CE6, 0xFF00, 0x01));

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast());
        assert!(found.is_none());
    }

    #[test]
    fn test_first_match_wins_after_skipping_unsupported() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::other("/dev/hidraw0", 0x045E, 0x0B13, 0x01, 0x05));
        bus.add(SimDevice::dualsense_edge("/dev/hidraw1"));
        bus.add(SimDevice::dualsense("/dev/hidraw2"));

        let found = find_supported_controller(&mut transport(&bus), &SupportedDevices::default(), fast())
            .expect("should match");
        assert_eq!(found.path, "/dev/hidraw1");
    }

    #[test]
    fn test_extra_allow_list_entry() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::other("/dev/hidraw0", 0x1234, 0x5678, 0x01, 0x04));
        let supported = SupportedDevices::with_extra(vec![SupportedDevice::new(0x1234, 0x5678, "Test Pad")]);

        let found = find_supported_controller(&mut transport(&bus), &supported, fast()).expect("should match");
        assert_eq!(found.display_name, "Test Pad");
    }

    #[test]
    fn test_probe_handles_are_closed() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::dualsense("/dev/hidraw0"));
        let mut transport = transport(&bus);

        find_supported_controller(&mut transport, &SupportedDevices::default(), fast());

        assert!(transport.cache().is_empty());
        assert_eq!(bus.open_count(), bus.close_count());
    }

    #[test]
    fn test_enumeration_failure_yields_none() {
        let mut backend = MockHidBackend::new();
        backend
            .expect_enumerate()
            .times(1)
            .returning(|| Err(HidIoError::Other("hid_enumerate failed".to_string())));
        backend.expect_open_path().times(0);

        let mut transport = FeatureReportTransport::new(Box::new(backend));
        let found = find_supported_controller(&mut transport, &SupportedDevices::default(), fast());
        assert!(found.is_none());
    }

    #[test]
    fn test_list_responsive_gamepads() {
        let bus = SimulatedBus::new();
        bus.add(SimDevice::dualsense("/dev/hidraw0"));
        bus.add(SimDevice::dualsense("/dev/hidraw1").unresponsive());
        bus.add(SimDevice::other("/dev/hidraw2", 0x046D, 0xC52B, 0x01, 0x06));

        let listed = list_responsive_gamepads(&mut transport(&bus), fast()).expect("enumerate");
        let paths: Vec<_> = listed.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/dev/hidraw0"]);
    }
}
