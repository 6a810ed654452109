//! Platform permission declarations consumed by location, media and
//! notification collaborators.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Platform permission the core may need before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformPermission {
    Location,
    MediaLibrary,
    Notification,
}

impl PlatformPermission {
    /// Stable string id used in error messages and across the FFI boundary.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::MediaLibrary => "media_library",
            Self::Notification => "notification",
        }
    }
}

impl Display for PlatformPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer returned by a platform permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}
