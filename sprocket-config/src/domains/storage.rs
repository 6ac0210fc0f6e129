//! Object store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, validate_url, Validatable};

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which store backs every bucket
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store, contents vanish with the process
    Memory,

    /// One directory per bucket under `root`
    Filesystem {
        #[serde(default = "default_filesystem_root")]
        root: PathBuf,
    },

    /// Redis server; keys are namespaced as `<bucket><separator><key>`
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,

        #[serde(default = "default_bucket_separator")]
        bucket_separator: String,
    },
}

/// Backend names accepted in files and environment overrides
pub const BACKEND_CHOICES: [&str; 3] = ["memory", "filesystem", "redis"];

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Filesystem {
            root: default_filesystem_root(),
        }
    }
}

impl StorageBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Filesystem { .. } => "filesystem",
            StorageBackend::Redis { .. } => "redis",
        }
    }

    /// Backend of the named kind with default settings
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "filesystem" | "fs" => Some(StorageBackend::Filesystem {
                root: default_filesystem_root(),
            }),
            "redis" => Some(StorageBackend::Redis {
                url: default_redis_url(),
                bucket_separator: default_bucket_separator(),
            }),
            _ => None,
        }
    }
}

impl Validatable for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Filesystem { root } => {
                validate_required_string(&root.to_string_lossy(), "root", self.domain_name())
            }
            StorageBackend::Redis {
                url,
                bucket_separator,
            } => {
                validate_url(url, &["redis", "rediss", "unix"], "url", self.domain_name())?;
                validate_required_string(bucket_separator, "bucket_separator", self.domain_name())
            }
        }
    }

    fn domain_name(&self) -> &'static str {
        "storage"
    }
}

pub(crate) fn default_filesystem_root() -> PathBuf {
    PathBuf::from("/tmp/sprocket-store")
}

pub(crate) fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_bucket_separator() -> String {
    "/".to_string()
}
