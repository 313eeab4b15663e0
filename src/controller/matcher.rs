//! # Joystick Matcher
//!
//! Correlates the HID controller of a session with a joystick from the input
//! layer. Rules are tried in order and the first rule that selects a joystick
//! wins, so exact ID matches take precedence over name heuristics.
//!
//! ```
//! use driftguard::controller::identity::ControllerIdentity;
//! use driftguard::controller::joystick::JoystickInfo;
//! use driftguard::controller::matcher::JoystickMatcher;
//!
//! let identity = ControllerIdentity {
//!     vendor_id: 0x054C,
//!     product_id: 0x0CE6,
//!     display_name: "Sony DualSense (PS5)".to_string(),
//!     path: "/dev/hidraw0".to_string(),
//! };
//! let joysticks = vec![JoystickInfo {
//!     id: "/dev/input/event5".to_string(),
//!     name: "DualSense Wireless Controller".to_string(),
//!     vendor_id: None,
//!     product_id: None,
//! }];
//!
//! let matcher = JoystickMatcher::from_patterns(&["DualSense".to_string()]);
//! assert_eq!(matcher.select(&identity, &joysticks).map(|j| j.id.as_str()), Some("/dev/input/event5"));
//! ```

use super::identity::ControllerIdentity;
use super::joystick::JoystickInfo;

/// One correlation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Joystick reports the same vendor and product IDs.
    VendorProduct,
    /// Joystick name contains the IDs as hex, e.g. `054c` and `0ce6`.
    IdsInName,
    /// Joystick name contains the given text (case-insensitive).
    NameContains(String),
}

impl MatchRule {
    fn matches(&self, identity: &ControllerIdentity, joystick: &JoystickInfo) -> bool {
        match self {
            Self::VendorProduct => {
                joystick.vendor_id == Some(identity.vendor_id)
                    && joystick.product_id == Some(identity.product_id)
            }
            Self::IdsInName => {
                let name = joystick.name.to_ascii_lowercase();
                name.contains(&format!("{:04x}", identity.vendor_id))
                    && name.contains(&format!("{:04x}", identity.product_id))
            }
            Self::NameContains(pattern) => joystick
                .name
                .to_lowercase()
                .contains(&pattern.to_lowercase()),
        }
    }
}

/// Ordered list of [`MatchRule`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickMatcher {
    rules: Vec<MatchRule>,
}

impl Default for JoystickMatcher {
    fn default() -> Self {
        Self::from_patterns(&["DualSense".to_string(), "Wireless Controller".to_string()])
    }
}

impl JoystickMatcher {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        Self { rules }
    }

    /// ID rules first, then one [`MatchRule::NameContains`] per pattern.
    pub fn from_patterns(patterns: &[String]) -> Self {
        let mut rules = vec![MatchRule::VendorProduct, MatchRule::IdsInName];
        rules.extend(patterns.iter().cloned().map(MatchRule::NameContains));
        Self { rules }
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Pick the joystick belonging to `identity`, if any.
    pub fn select<'a>(
        &self,
        identity: &ControllerIdentity,
        joysticks: &'a [JoystickInfo],
    ) -> Option<&'a JoystickInfo> {
        self.rules.iter().find_map(|rule| {
            joysticks
                .iter()
                .find(|joystick| rule.matches(identity, joystick))
        })
    }
}
