//! Server settings.
//!
//! Three scalars drive the server: the catalog path, the UDP port and
//! the reservation timeout. Port and timeout can come from an optional
//! TOML file; command-line flags overlay whatever the file says.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 2022;

pub const MIN_TIMEOUT: u32 = 1;
pub const MAX_TIMEOUT: u32 = 86_400;
pub const DEFAULT_TIMEOUT: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP port to listen on; 0 asks the OS for an ephemeral port.
    pub port: u16,
    /// Seconds before an uncollected reservation expires.
    pub timeout: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&self.timeout) {
            return Err(ConfigError::TimeoutOutOfRange { got: self.timeout });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("timeout {got} out of range, acceptable range: {MIN_TIMEOUT}-{MAX_TIMEOUT}")]
    TimeoutOutOfRange { got: u32 },
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}
