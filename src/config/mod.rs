//! Configuration management for haulbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use haulbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Workspaces under: {}", config.storage.temp_root.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `HAULBOX__<section>__<key>`
//!
//! Examples:
//! - `HAULBOX__STORAGE__TEMP_ROOT=/var/tmp/haulbox`
//! - `HAULBOX__CREDENTIALS__TTL=1h`
//! - `HAULBOX__STORAGE__REMOTE_INDICATORS=/volumes/,/mnt/,smb://`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/haulbox.toml`.
//! This can be overridden using the `HAULBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, CredentialSourceKind, CredentialsConfig, EngineConfig, LedgerConfig,
    PlaylistConfig, ProfileConfig, RetryConfig, StorageConfig, WorkerConfig,
};
pub use validation::{ValidationError, MAX_AUTH_RETRIES_LIMIT, MAX_CREDENTIAL_TTL_SECS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`HAULBOX__*`)
    /// 2. TOML file (default: `config/haulbox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Render as a TOML document that loads back to the same settings
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
