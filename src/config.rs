//! Relay configuration
//!
//! The port and read-buffer size must match between server and client,
//! so both sides build their settings from the same defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RelayError;

/// Default listen/dial port
pub const DEFAULT_PORT: u16 = 8080;

/// Default host the client dials and the server binds
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Size of the per-read buffer; one read is one message
pub const BUFFER_SIZE: usize = 1024;

/// How long `main` waits for a stop to finish before giving up on it
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Settings shared by the server and the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_size: BUFFER_SIZE,
        }
    }
}

impl RelayConfig {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse settings from a JSON document
    pub fn from_json(raw: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.buffer_size == 0 {
            return Err(RelayError::InvalidConfig(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` string used for bind and dial
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
