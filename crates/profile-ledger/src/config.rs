//! Directory configuration: storage location, hashing cost, validation and logging

use crate::credentials::HasherConfig;
use crate::error::DirectoryError;
use crate::observability::LoggingConfig;
use crate::validation::ProfileValidationContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Profile directory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Root directory for the file backend
    pub data_dir: PathBuf,
    /// Argon2id cost parameters
    pub hasher: HasherConfig,
    /// Check the `local@domain.tld` email shape
    pub validate_email_format: bool,
    /// Require a six-digit pincode on every address
    pub require_address_pincodes: bool,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            hasher: HasherConfig::default(),
            validate_email_format: true,
            require_address_pincodes: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl DirectoryConfig {
    /// Create a new configuration with the specified data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the hasher cost parameters
    pub fn with_hasher(mut self, hasher: HasherConfig) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the address pincode requirement
    pub fn with_address_pincodes(mut self, enabled: bool) -> Self {
        self.require_address_pincodes = enabled;
        self
    }

    /// Set the email shape check
    pub fn with_email_format_check(mut self, enabled: bool) -> Self {
        self.validate_email_format = enabled;
        self
    }

    /// Validation context derived from this configuration
    pub fn validation_context(&self) -> ProfileValidationContext {
        ProfileValidationContext {
            validate_email_format: self.validate_email_format,
            require_address_pincodes: self.require_address_pincodes,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(DirectoryError::config("data_dir must not be empty"));
        }
        self.hasher.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// A missing file is created with the default configuration.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = ?path, "Config file not found, creating default");
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: DirectoryConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        debug!(path = ?path, "Saved config");
        Ok(())
    }
}
