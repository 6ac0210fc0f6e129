//! Domain-driven configuration management for Sprocket
//!
//! Worker settings are split by functional domain (storage, fetch, logging),
//! each with validation, defaults and `SPROCKET_*` environment overrides.
//! The per-invocation job document lives in [`job`].

pub mod error;
pub mod job;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use job::JobConfig;
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    fetch::FetchConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    storage::{StorageBackend, StorageConfig},
    SprocketConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
