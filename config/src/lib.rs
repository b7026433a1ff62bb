//! `lintel.toml` configuration.
//!
//! Looked up in the workspace root first, then `~/.lintel/config.toml`.
//! Every field is optional; accessors apply the defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lintel_types::{DEFAULT_SOURCE, EditorModePolicy};
use serde::Deserialize;
use toml::de::Error as TomlError;

/// File name looked up in the workspace root.
pub const WORKSPACE_CONFIG_FILE: &str = "lintel.toml";

pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: TomlError,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LintelConfig {
    pub analysis: Option<AnalysisConfig>,
    /// Absent means the reflection bridge is disabled.
    pub bridge: Option<BridgeConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// `[program, leading args...]`, replacing runtime detection.
    pub command: Option<Vec<String>>,
    /// Injected before the `--` separator.
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub config_path: Option<PathBuf>,
    /// Read by hosts that drive `AnalysisScheduler`; one-shot `lintel check`
    /// runs analyze immediately and never debounce.
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub editor_mode: EditorModePolicy,
    pub source: Option<String>,
}

impl AnalysisConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.source
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SOURCE)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// `[program, args...]` of the worker.
    #[serde(default)]
    pub command: Vec<String>,
    pub request_timeout_ms: Option<u64>,
}

impl BridgeConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }
}

impl LintelConfig {
    /// Load the first config file that exists.
    ///
    /// Returns `Ok(None)` when no config file exists.
    pub fn load(workspace_root: &Path) -> Result<Option<Self>, ConfigError> {
        for path in candidate_paths(workspace_root) {
            if path.exists() {
                return Self::from_path(&path).map(Some);
            }
        }
        Ok(None)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Debounce delay for an embedding host's scheduler, defaulted when
    /// `[analysis]` is absent.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.analysis
            .as_ref()
            .map_or(Duration::from_millis(DEFAULT_DEBOUNCE_MS), AnalysisConfig::debounce)
    }
}

/// Config locations in lookup order.
#[must_use]
pub fn candidate_paths(workspace_root: &Path) -> Vec<PathBuf> {
    let mut paths = vec![workspace_root.join(WORKSPACE_CONFIG_FILE)];
    if let Some(user) = user_config_path() {
        paths.push(user);
    }
    paths
}

#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lintel").join("config.toml"))
}
