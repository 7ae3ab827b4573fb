//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::types::DeviceRole;

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Companion engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which side owns the journal content.
    pub role: DeviceRole,
    /// Push a fresh snapshot after merging a completion (authoritative side only).
    pub repush_on_completion: bool,
    /// Ask the authoritative side for its snapshot once activated (companion only).
    pub request_initial_data: bool,
    /// Capacity of the `SyncEvent` broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::Primary,
            repush_on_completion: true,
            request_initial_data: true,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Defaults for the authoritative device
    pub fn primary() -> Self {
        Self::default()
    }

    /// Defaults for the mirroring device
    pub fn companion() -> Self {
        Self {
            role: DeviceRole::Companion,
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        info!(path = %path.display(), role = %config.role, "Loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(SyncError::Config(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
