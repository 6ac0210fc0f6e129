//! Backend selection from configuration

use sprocket_config::{StorageBackend, StorageConfig};
use std::sync::Arc;
use tracing::info;

use crate::filesystem::FileSystemBackend;
use crate::memory::MemoryBackend;
use crate::store::{ObjectStore, StoreProvider};
use crate::StorageResult;

/// The configured backend
#[derive(Debug, Clone)]
pub enum Storage {
    Memory(MemoryBackend),
    FileSystem(FileSystemBackend),
    #[cfg(feature = "redis")]
    Redis(crate::redis::RedisBackend),
}

impl Storage {
    /// Build the backend named by `config`, connecting when it is remote
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let storage = match &config.backend {
            StorageBackend::Memory => Storage::Memory(MemoryBackend::new()),
            StorageBackend::Filesystem { root } => {
                Storage::FileSystem(FileSystemBackend::new(root.clone()))
            }
            #[cfg(feature = "redis")]
            StorageBackend::Redis {
                url,
                bucket_separator,
            } => Storage::Redis(
                crate::redis::RedisBackend::new(url)
                    .await?
                    .with_separator(bucket_separator.clone()),
            ),
            #[cfg(not(feature = "redis"))]
            StorageBackend::Redis { .. } => {
                return Err(crate::StorageError::Backend {
                    message: "redis support was not compiled in".to_string(),
                    source: None,
                })
            }
        };

        info!("Using {} storage backend", config.backend.kind());
        Ok(storage)
    }
}

impl StoreProvider for Storage {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        match self {
            Storage::Memory(backend) => backend.store(bucket),
            Storage::FileSystem(backend) => backend.store(bucket),
            #[cfg(feature = "redis")]
            Storage::Redis(backend) => backend.store(bucket),
        }
    }
}
