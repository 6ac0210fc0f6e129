//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::storage::{StorageBackend, BACKEND_CHOICES};
use crate::domains::SprocketConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::job::is_yaml;
use crate::validation::validate_enum_choice;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SPROCKET".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML or JSON file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SprocketConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: SprocketConfig = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<SprocketConfig> {
        let mut config = SprocketConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SprocketConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut SprocketConfig) -> ConfigResult<()> {
        self.apply_storage_overrides(&mut config.storage.backend)?;
        self.apply_fetch_overrides(&mut config.fetch)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply storage config overrides
    fn apply_storage_overrides(&self, backend: &mut StorageBackend) -> ConfigResult<()> {
        if let Ok(kind) = self.get_env_var("STORAGE_BACKEND") {
            validate_enum_choice(&kind, &BACKEND_CHOICES, "STORAGE_BACKEND", "storage")
                .map_err(|e| ConfigError::EnvError(e.to_string()))?;
            if !backend.kind().eq_ignore_ascii_case(&kind) {
                *backend = StorageBackend::from_kind(&kind).ok_or_else(|| {
                    ConfigError::EnvError(format!("Invalid STORAGE_BACKEND: {}", kind))
                })?;
            }
        }

        match backend {
            StorageBackend::Filesystem { root } => {
                if let Ok(path) = self.get_env_var("FILESYSTEM_ROOT") {
                    *root = PathBuf::from(path);
                }
            }
            StorageBackend::Redis { url, .. } => {
                if let Ok(redis_url) = self.get_env_var("REDIS_URL") {
                    *url = redis_url;
                }
            }
            StorageBackend::Memory => {}
        }

        Ok(())
    }

    /// Apply fetch config overrides
    fn apply_fetch_overrides(
        &self,
        config: &mut crate::domains::fetch::FetchConfig,
    ) -> ConfigResult<()> {
        if let Ok(attempts) = self.get_env_var("FETCH_MAX_ATTEMPTS") {
            config.max_attempts = attempts.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid FETCH_MAX_ATTEMPTS: {}", e))
            })?;
        }

        if let Ok(backoff) = self.get_env_var("FETCH_INITIAL_BACKOFF_MS") {
            let millis: u64 = backoff.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid FETCH_INITIAL_BACKOFF_MS: {}", e))
            })?;
            config.initial_backoff = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
