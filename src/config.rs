// Configuration management for codesense

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub const CONFIG_FILE_NAME: &str = ".codesense.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub completion: CompletionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Directory names pruned from walks and ignored in watch events
    pub exclude_dirs: Vec<String>,
    /// Files above this many bytes are never indexed
    pub max_file_size: u64,
    pub debounce_ms: u64,
    pub workers: usize,
    pub follow_symlinks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 0 means unlimited
    pub default_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: [
                ".git",
                ".hg",
                ".svn",
                "__pycache__",
                "node_modules",
                ".venv",
                "venv",
                ".idea",
                ".vscode",
                "dist",
                "build",
                "target",
                ".mypy_cache",
                ".pytest_cache",
            ]
            .iter()
            .map(|dir| dir.to_string())
            .collect(),
            max_file_size: 1024 * 1024,
            debounce_ms: 1000,
            workers: 4,
            follow_symlinks: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 100 }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self { max_results: 50 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory.
    /// Looks for .codesense.toml in the directory, defaults otherwise.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {:#}", config_path.display(), e);
                Self::default()
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.indexing.debounce_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexError> {
        let invalid = |message: &str| Err(IndexError::Config(message.to_string()));

        if self.indexing.max_file_size == 0 {
            return invalid("max_file_size must be greater than 0");
        }
        if self.indexing.debounce_ms == 0 {
            return invalid("debounce_ms must be greater than 0");
        }
        if self.indexing.workers == 0 {
            return invalid("workers must be greater than 0");
        }
        if self.completion.max_results == 0 {
            return invalid("completion max_results must be greater than 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(IndexError::Config(format!("Invalid log level: {}", self.logging.level)));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(IndexError::Config(format!("Invalid log format: {}", self.logging.format)));
        }

        Ok(())
    }
}
