//! Store configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables for a store instance and the watchers attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Buffered change publications per watcher before it is considered lagged.
    pub change_channel_capacity: usize,
    /// Results a watcher may queue for its consumer.
    pub watch_buffer: usize,
    /// Fold publications that queued up while a watcher was busy into a
    /// single re-evaluation against the latest state.
    pub coalesce_bursts: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            change_channel_capacity: 256,
            watch_buffer: 16,
            coalesce_bursts: true,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `NORMCACHE_CHANGE_CHANNEL_CAPACITY`: change buffer per watcher (default: 256)
    /// - `NORMCACHE_WATCH_BUFFER`: queued results per watcher (default: 16)
    /// - `NORMCACHE_COALESCE_BURSTS`: "true" or "false" (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let change_channel_capacity = std::env::var("NORMCACHE_CHANGE_CHANNEL_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.change_channel_capacity);

        let watch_buffer = std::env::var("NORMCACHE_WATCH_BUFFER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.watch_buffer);

        let coalesce_bursts = std::env::var("NORMCACHE_COALESCE_BURSTS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.coalesce_bursts);

        Self {
            change_channel_capacity,
            watch_buffer,
            coalesce_bursts,
        }
    }

    pub fn with_change_channel_capacity(mut self, capacity: usize) -> Self {
        self.change_channel_capacity = capacity;
        self
    }

    pub fn with_watch_buffer(mut self, buffer: usize) -> Self {
        self.watch_buffer = buffer;
        self
    }

    pub fn with_coalesce_bursts(mut self, enabled: bool) -> Self {
        self.coalesce_bursts = enabled;
        self
    }

    /// Reject values the channels cannot be built with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.change_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "change_channel_capacity".to_string(),
                value: self.change_channel_capacity.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watch_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_buffer".to_string(),
                value: self.watch_buffer.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
