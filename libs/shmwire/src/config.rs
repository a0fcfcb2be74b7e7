// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime configuration via `shmwire.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, WireError};

/// Sizing for [`crate::InProcessTransport`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum transport size in bytes.
    pub capacity: usize,
    /// Region alignment; must be a power of two.
    pub alignment: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024,
            alignment: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskRunnerConfig {
    /// Pending task limit. `None` leaves the queue unbounded.
    pub queue_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstrumentationConfig {
    pub enabled: bool,
    /// Prefix for instrumentation log targets.
    pub prefix: String,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "shmwire".to_string(),
        }
    }
}

/// Configuration from `shmwire.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WireConfig {
    pub transport: TransportConfig,
    pub task_runner: TaskRunnerConfig,
    pub instrumentation: InstrumentationConfig,
}

impl WireConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "shmwire.toml";

    /// Environment variable naming an explicit config file.
    pub const ENV_VAR: &'static str = "SHMWIRE_CONFIG";

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WireError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a file. Returns error if the file is missing
    /// or cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WireError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            WireError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded shmwire config from {}", path.display());
        Ok(config)
    }

    /// Load `shmwire.toml` from a directory, returning defaults if the file
    /// is missing or unparseable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load the file named by `SHMWIRE_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(Self::ENV_VAR) {
            Some(path) => Self::load(&PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WireConfig::default();
        assert_eq!(config.transport.capacity, 1024 * 1024);
        assert_eq!(config.transport.alignment, 8);
        assert_eq!(config.task_runner.queue_limit, None);
        assert!(!config.instrumentation.enabled);
        assert_eq!(config.instrumentation.prefix, "shmwire");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = WireConfig::parse(
            r#"
            [transport]
            alignment = 64

            [task_runner]
            queue_limit = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.alignment, 64);
        assert_eq!(config.transport.capacity, 1024 * 1024);
        assert_eq!(config.task_runner.queue_limit, Some(16));
        assert_eq!(config.instrumentation, InstrumentationConfig::default());
    }

    #[test]
    fn test_bad_toml_is_configuration_error() {
        assert!(matches!(
            WireConfig::parse("[transport\ncapacity = "),
            Err(WireError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = WireConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, WireError::Configuration(_)));
    }

    #[test]
    fn test_load_or_default() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        assert_eq!(WireConfig::load_or_default(dir), WireConfig::default());

        std::fs::write(
            dir.join(WireConfig::FILE_NAME),
            "[instrumentation]\nenabled = true\nprefix = \"ipc\"\n",
        )
        .unwrap();
        let config = WireConfig::load_or_default(dir);
        assert!(config.instrumentation.enabled);
        assert_eq!(config.instrumentation.prefix, "ipc");

        std::fs::write(dir.join(WireConfig::FILE_NAME), "not = [valid").unwrap();
        assert_eq!(WireConfig::load_or_default(dir), WireConfig::default());
    }
}
