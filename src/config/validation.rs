//! Configuration validation utilities.

use crate::config::{Config, ConfigError};

fn validate_api_base(config: &Config) -> Result<(), ConfigError> {
    let base = config.github.api_base.trim();
    if base.is_empty() {
        return Err(ConfigError::ValidationError(
            "github.api_base must not be empty".to_string(),
        ));
    }
    url::Url::parse(base).map_err(|e| {
        ConfigError::ValidationError(format!("github.api_base '{}' is not a URL: {}", base, e))
    })?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port must be non-zero".to_string(),
        ));
    }
    Ok(())
}

/// Loose check of git's ref-name rules for a branch name or name prefix.
pub fn is_valid_ref_name(name: &str) -> bool {
    !(name.is_empty()
        || name.starts_with('/')
        || name.starts_with('-')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.contains("//")
        || name.contains("@{")
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')))
}

fn validate_branch_prefix(config: &Config) -> Result<(), ConfigError> {
    let prefix = &config.commit.branch_prefix;
    if !is_valid_ref_name(prefix) {
        return Err(ConfigError::ValidationError(format!(
            "commit.branch_prefix '{}' is not a valid ref component",
            prefix
        )));
    }
    Ok(())
}

fn validate_encoding(config: &Config) -> Result<(), ConfigError> {
    match config.commit.default_encoding.as_str() {
        "base64" | "utf-8" => Ok(()),
        other => Err(ConfigError::ValidationError(format!(
            "commit.default_encoding must be 'base64' or 'utf-8', got '{}'",
            other
        ))),
    }
}

/// Configuration validator
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        validate_api_base(config)?;
        validate_server(config)?;
        validate_branch_prefix(config)?;
        validate_encoding(config)?;
        Ok(())
    }
}
