use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::ErrorCode;
use crate::subprocess::streaming::StreamingConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl ConfigError {
    pub fn code(&self) -> u16 {
        match self {
            ConfigError::NotFound { .. } => ErrorCode::CONFIG_NOT_FOUND,
            ConfigError::Read { .. } => ErrorCode::CONFIG_GENERIC,
            ConfigError::Parse { .. } => ErrorCode::CONFIG_PARSE_ERROR,
            ConfigError::InvalidValue(_) => ErrorCode::CONFIG_INVALID_VALUE,
        }
    }
}

/// Get the platform directory holding `config.toml`
pub fn get_config_dir() -> Result<PathBuf> {
    ProjectDirs::from("dev", "siphon", "siphon")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiphonConfig {
    pub log_level: Option<String>,
    pub streaming: StreamingConfig,
}

impl Default for SiphonConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            streaming: StreamingConfig::default(),
        }
    }
}

impl SiphonConfig {
    /// Load configuration, apply `SIPHON_*` overrides and validate.
    ///
    /// An explicit `path` must exist. Without one, `config.toml` in the
    /// platform config directory is used when present.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => match get_config_dir() {
                Ok(dir) if dir.join("config.toml").exists() => {
                    Self::from_file(&dir.join("config.toml")).await?
                }
                _ => Self::default(),
            },
        };

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup("SIPHON_LOG_LEVEL") {
            self.log_level = Some(log_level);
        }

        if let Some(size) = lookup("SIPHON_READ_BUFFER_SIZE") {
            self.streaming.read_buffer_size = size.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!("SIPHON_READ_BUFFER_SIZE is not a number: {size}"))
            })?;
        }

        if let Some(marker) = lookup("SIPHON_FAILURE_MARKER") {
            self.streaming.failure_marker = marker;
        }

        if let Some(lines) = lookup("SIPHON_MAX_DIAGNOSTIC_LINES") {
            let lines = lines.trim();
            self.streaming.max_diagnostic_lines = if lines.is_empty() {
                None
            } else {
                Some(lines.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!(
                        "SIPHON_MAX_DIAGNOSTIC_LINES is not a number: {lines}"
                    ))
                })?)
            };
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.streaming.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "streaming.read_buffer_size must be greater than 0".to_string(),
            )
            .into());
        }
        if self.streaming.failure_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "streaming.failure_marker must not be empty".to_string(),
            )
            .into());
        }
        if self.streaming.max_diagnostic_lines == Some(0) {
            return Err(ConfigError::InvalidValue(
                "streaming.max_diagnostic_lines must be greater than 0 when set".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
