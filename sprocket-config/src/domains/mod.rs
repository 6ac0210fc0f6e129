//! Domain-specific configuration modules

pub mod fetch;
pub mod logging;
pub mod storage;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Worker configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SprocketConfig {
    /// Object store the worker reads from and writes to
    #[serde(default)]
    pub storage: storage::StorageConfig,

    /// Retry behaviour of storage reads
    #[serde(default)]
    pub fetch: fetch::FetchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl SprocketConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.storage.validate()?;
        self.fetch.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = SprocketConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
