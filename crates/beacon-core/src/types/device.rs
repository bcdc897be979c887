//! Device classification, consumed as an external tag.

use serde::{Deserialize, Serialize};

/// Coarse device class attached to each presence record.
///
/// The classification itself is produced outside the core (a tag on JOIN);
/// the server only branches on it for the disconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Desktop or laptop browser.
    #[default]
    Desktop,
    /// Phone browser.
    Mobile,
    /// Tablet browser.
    Tablet,
}

impl DeviceClass {
    /// Whether this device gets the aggressive disconnect cleanup.
    ///
    /// Handheld tab switchers fire close without LEAVE; desktops fire close
    /// on real intent and are covered by TTL plus explicit LEAVE.
    pub fn is_handheld(&self) -> bool {
        matches!(self, Self::Mobile | Self::Tablet)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        };
        f.write_str(name)
    }
}
