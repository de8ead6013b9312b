//! Daemon configuration
//!
//! A small YAML file; every field has a default so the daemon runs with no
//! configuration at all. A missing file means defaults, an unreadable or
//! invalid file is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default location of the controller's socket
const DEFAULT_SOCKET_PATH: &str = "/run/dsf/dcs.sock";

/// Macro run once at startup on a separate connection
const DEFAULT_STARTUP_MACRO: &str = "sbctrigger.g";

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Path to the controller's UNIX socket
    pub socket_path: PathBuf,

    /// Poll interval for every trigger loop, in milliseconds
    pub poll_interval_ms: u64,

    /// Startup macro run via `M98` on a detached connection; empty string
    /// disables the bootstrap entirely
    pub startup_macro: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            poll_interval_ms: 250,
            startup_macro: DEFAULT_STARTUP_MACRO.to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load from a YAML file, falling back to defaults when it is absent
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "poll_interval_ms: 500").unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.startup_macro, DEFAULT_STARTUP_MACRO);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "poll_interval_ms: [not a number").unwrap();

        assert!(matches!(
            DaemonConfig::load(&path),
            Err(ConfigError::ParseYaml { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "pol_interval_ms: 500").unwrap();

        assert!(DaemonConfig::load(&path).is_err());
    }
}
