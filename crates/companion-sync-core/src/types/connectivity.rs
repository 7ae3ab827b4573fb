//! Connectivity and session lifecycle types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of the companion link as reported by one session query.
///
/// Replaced wholesale on every lifecycle event; the three fields are never
/// updated individually.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectivityState {
    /// A companion device is paired with this one
    pub is_paired: bool,
    /// The companion app is installed on the paired device
    pub is_companion_app_installed: bool,
    /// The companion can receive immediate messages right now
    pub is_reachable: bool,
}

impl ConnectivityState {
    /// Create a connectivity snapshot from one session query
    pub fn new(is_paired: bool, is_companion_app_installed: bool, is_reachable: bool) -> Self {
        Self {
            is_paired,
            is_companion_app_installed,
            is_reachable,
        }
    }

    /// Short status text for a connectivity indicator
    pub fn label(&self) -> &'static str {
        if !self.is_paired {
            "not paired"
        } else if !self.is_companion_app_installed {
            "app not installed"
        } else if self.is_reachable {
            "connected"
        } else {
            "waiting for connection"
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Top-level activation state of the peer session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// `set_up` has not issued an activation (or the platform is unsupported)
    #[default]
    Unactivated,
    /// Activation was requested and has not completed yet
    Activating,
    /// The session is usable; connectivity fields may still toggle
    Activated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unactivated => write!(f, "Unactivated"),
            SessionState::Activating => write!(f, "Activating"),
            SessionState::Activated => write!(f, "Activated"),
        }
    }
}

/// Which side of the pair this process is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Owns the authoritative journal content and pushes snapshots
    #[default]
    Primary,
    /// Holds a read-mostly mirror of the primary's snapshot
    Companion,
}

impl DeviceRole {
    /// Whether this side owns the authoritative snapshot
    pub fn is_authoritative(&self) -> bool {
        matches!(self, DeviceRole::Primary)
    }

    /// Lowercase name, used for log file names
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Primary => "primary",
            DeviceRole::Companion => "companion",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
