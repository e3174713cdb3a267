//! CLI configuration management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".jobforge.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(serde_yaml::Error),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Global settings document.
    #[serde(default = "default_global")]
    pub global: PathBuf,
    /// Directory holding job-group documents.
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Directory generated descriptor files are written to.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_global() -> PathBuf {
    PathBuf::from("global.yaml")
}

fn default_input() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_output() -> PathBuf {
    PathBuf::from("generated")
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            global: default_global(),
            input: default_input(),
            output: default_output(),
        }
    }
}

impl CliConfig {
    /// Load configuration from the working directory, falling back to
    /// defaults when there is no config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        global: Option<PathBuf>,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> Self {
        if let Some(global) = global {
            self.global = global;
        }
        if let Some(input) = input {
            self.input = input;
        }
        if let Some(output) = output {
            self.output = output;
        }
        self
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "global" => self.global = PathBuf::from(value),
            "input" => self.input = PathBuf::from(value),
            "output" => self.output = PathBuf::from(value),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
