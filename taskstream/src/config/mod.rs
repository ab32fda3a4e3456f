//! Client configuration.
//!
//! Layered like the hub's config, minus the CLI: an optional TOML file
//! (`~/.config/taskstream/config.toml`) over compiled defaults. Embedding
//! applications pass an explicit path when they manage their own config
//! location.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::realtime::RealtimeConfig;

/// Errors that can occur when loading client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the client.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientConfigFile {
    realtime: RealtimeFileConfig,
}

/// `[realtime]` section of the client config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RealtimeFileConfig {
    hub_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    handshake_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub WebSocket URL.
    pub hub_url: String,
    /// Timeout for the TCP/WebSocket connect.
    pub connect_timeout: Duration,
    /// Timeout for the hub's `Connected` greeting.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: "ws://127.0.0.1:9000/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file over compiled defaults.
    ///
    /// With an explicit path, a missing file is an error. Without one,
    /// the default path is tried and a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(explicit_path)?;
        Ok(Self::resolve(&file))
    }

    /// Resolve a `ClientConfig` from a parsed config file.
    #[must_use]
    fn resolve(file: &ClientConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            hub_url: file
                .realtime
                .hub_url
                .clone()
                .unwrap_or(defaults.hub_url),
            connect_timeout: file
                .realtime
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            handshake_timeout: file
                .realtime
                .handshake_timeout_secs
                .map_or(defaults.handshake_timeout, Duration::from_secs),
        }
    }

    /// The realtime connection settings carried by this config.
    #[must_use]
    pub fn realtime(&self) -> RealtimeConfig {
        RealtimeConfig {
            hub_url: self.hub_url.clone(),
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse the client's TOML config file.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ClientConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ClientConfigFile::default());
        };
        config_dir.join("taskstream").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
