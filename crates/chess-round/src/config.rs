//! Configuration file loading for round sessions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Settings shared by every session a process drives.
///
/// Read from `round.toml`; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoundConfig {
    /// Interval of the local clock tick, in milliseconds. Defaults to 100.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Heartbeat samples averaged into the lag estimate. Defaults to 8.
    #[serde(default = "default_lag_samples")]
    pub lag_samples: usize,
    /// Directory holding suspended games. Defaults to `offline-games`.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// How long a lost connection is tolerated before the session is
    /// suspended, in milliseconds. Defaults to 10000.
    #[serde(default = "default_suspend_grace_ms")]
    pub suspend_grace_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_lag_samples() -> usize {
    8
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("offline-games")
}

fn default_suspend_grace_ms() -> u64 {
    10_000
}

impl Default for RoundConfig {
    fn default() -> Self {
        RoundConfig {
            tick_interval_ms: default_tick_interval_ms(),
            lag_samples: default_lag_samples(),
            store_dir: default_store_dir(),
            suspend_grace_ms: default_suspend_grace_ms(),
        }
    }
}

impl RoundConfig {
    /// Loads `round.toml` from the working directory, or defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Loads configuration from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> PathBuf {
        PathBuf::from("round.toml")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn suspend_grace(&self) -> Duration {
        Duration::from_millis(self.suspend_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoundConfig::load_from(dir.path().join("round.toml")).unwrap();
        assert_eq!(config, RoundConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round.toml");
        std::fs::write(&path, "tick_interval_ms = 250\nstore_dir = \"/tmp/games\"\n").unwrap();
        let config = RoundConfig::load_from(&path).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/games"));
        assert_eq!(config.lag_samples, 8);
        assert_eq!(config.suspend_grace(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round.toml");
        std::fs::write(&path, "tick_interval_ms = \"fast\"").unwrap();
        assert!(matches!(
            RoundConfig::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
