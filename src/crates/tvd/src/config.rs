//! TOML configuration for the daemon.
//!
//! ```toml
//! [daemon]
//! listen = "127.0.0.1:5455"
//! log_level = "info"
//!
//! [[tv]]
//! name = "living-room"
//! model = "bravia"
//! address = "10.0.0.5"
//!
//! [[tv]]
//! name = "bedroom"
//! model = "lg"
//! device = "/dev/ttyUSB0"
//! baud = 9600
//! set_id = 1
//! ```
//!
//! Each `[[tv]]` entry names its driver model and, for line-attached sets,
//! how to open the transport.  Keys the daemon itself does not know
//! (`address`, `set_id`, …) are collected verbatim and handed to the
//! model's factory, which owns their schema.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system error other than "not found".
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default, rename = "tv")]
    pub tvs: Vec<TvEntry>,
}

/// General daemon behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonSection {
    /// Address the HTTP adapter listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// `tracing` log level; overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One configured television.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TvEntry {
    /// Name the HTTP adapter exposes this set under.
    pub name: String,
    /// Registry name of the driver model.
    pub model: String,
    /// Serial device path, for line-attached sets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Baud rate for the serial device.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Address of a serial-device server, as an alternative to `device`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,
    /// Everything else belongs to the model's factory.
    #[serde(flatten)]
    pub model_config: toml::Table,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5455))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud() -> u32 {
    9600
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
        }
    }
}

/// Loads the configuration from `path`, returning the defaults when the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found" and [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(path: &Path) -> Result<DaemonConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DaemonConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
