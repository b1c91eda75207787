//! Configuration management for staticms.
//!
//! Settings live in a TOML file (by default `<config dir>/staticms/config.toml`);
//! a missing file means defaults for every section.

pub mod loader;
pub mod validation;

use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub commit: CommitConfig,
    pub drafts: DraftConfig,
    pub logging: LogConfig,
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

/// Git-hosting API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

/// Batch-commit behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Prefix of generated branch names when a pull request is requested.
    pub branch_prefix: String,
    /// Pull request description used when the caller gives none.
    pub pr_body: String,
    /// Blob encoding applied to updates that don't name one.
    pub default_encoding: String,
    /// Rebuilds attempted after the base branch moved under a commit.
    pub ref_update_retries: u32,
}

/// Local draft storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    pub storage_path: PathBuf,
}

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

/// Configuration manager
#[derive(Debug)]
pub struct ConfigManager {
    config: Config,
    config_path: PathBuf,
    loader: loader::ConfigLoader,
    validator: validation::ConfigValidator,
}

impl ConfigManager {
    /// Create a configuration manager, reading the file if it exists
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = config_path.is_some();
        let config_path = config_path.unwrap_or_else(default_config_path);

        let loader = loader::ConfigLoader::new();
        let validator = validation::ConfigValidator::new();

        let config = if config_path.exists() {
            loader.load_from_file(&config_path)?
        } else if explicit {
            return Err(ConfigError::FileNotFound(config_path));
        } else {
            Config::default()
        };
        validator.validate(&config)?;

        Ok(Self {
            config,
            config_path,
            loader,
            validator,
        })
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.loader.save_to_file(&self.config, &self.config_path)
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Update a configuration value
    pub fn update<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        let mut next = self.config.clone();
        updater(&mut next);
        self.validator.validate(&next)?;
        self.config = next;
        Ok(())
    }

    /// Render the active configuration as TOML
    pub fn export_as_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.config)?)
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("staticms")
        .join("config.toml")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_enabled: true,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            user_agent: format!("staticms/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "staticms-draft-".to_string(),
            pr_body: "Created by Staticms".to_string(),
            default_encoding: "base64".to_string(),
            ref_update_retries: 2,
        }
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            storage_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("staticms")
                .join("drafts.json"),
        }
    }
}
