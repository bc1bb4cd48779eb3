//! Configuration file support.
//!
//! # Configuration Format
//!
//! ```toml
//! minimum_version = "1.3.0"   # optional, overrides the build-time minimum
//!
//! [timeouts]
//! query_timeout = 5           # seconds
//! version_check_timeout = 5   # seconds
//! connection_timeout = 0      # seconds, 0 = no limit
//! teardown_grace = 100        # milliseconds
//! keepalive_interval = 30     # seconds, 0 = no pings
//!
//! [live]
//! buffer_capacity = 50        # messages kept per tab
//!
//! [connection]
//! protocol = "ws"
//! hostname = "localhost:8000"
//! namespace = "test"
//! database = "test"
//! auth_mode = "root"
//! username = "root"
//! password = "root"
//! ```
//!
//! Every section is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StudioLinkError};
use crate::live::DEFAULT_MESSAGE_CAPACITY;
use crate::models::ConnectionConfig;
use crate::timeouts::StudioLinkTimeouts;

/// Top-level configuration for a [`StudioLinkClient`](crate::StudioLinkClient).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Overrides the build-time minimum engine version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,

    #[serde(default)]
    pub timeouts: StudioLinkTimeouts,

    #[serde(default)]
    pub live: LiveConfig,

    /// Connection used by `connect_configured`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Live messages kept per tab (default: 50)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_MESSAGE_CAPACITY
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl LinkConfig {
    /// Load configuration from file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            StudioLinkError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(contents)?;
        if config.live.buffer_capacity == 0 {
            return Err(StudioLinkError::ConfigurationError(
                "live.buffer_capacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Save configuration to file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            StudioLinkError::ConfigurationError(format!("Failed to serialize: {}", e))
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
