//! Directory-backed object store
//!
//! Each bucket is a directory under the configured root and each key a file
//! path relative to it. Writes go to a temporary sibling first and are
//! renamed into place, so readers never observe a partially written object.

use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;
use walkdir::WalkDir;

use crate::store::{validate_key, ByteRange, ObjectReader, ObjectStore, StoreProvider};
use crate::{StorageError, StorageResult};

const TEMP_MARKER: &str = ".sprocket-tmp-";

/// Root directory holding one directory per bucket
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket(&self, bucket: &str) -> FileSystemStore {
        FileSystemStore {
            bucket: bucket.to_string(),
            dir: self.root.join(bucket),
        }
    }
}

impl StoreProvider for FileSystemBackend {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(self.bucket(bucket))
    }
}

/// One bucket directory
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    bucket: String,
    dir: PathBuf,
}

impl FileSystemStore {
    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    fn map_io(&self, key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NoSuchKey {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            }
        } else {
            StorageError::io(key, err)
        }
    }
}

#[async_trait]
impl ObjectStore for FileSystemStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        debug!(bucket = %self.bucket, key, bytes = data.len(), "filesystem put");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = path.with_file_name(format!(
            "{}{}{}",
            TEMP_MARKER,
            uuid::Uuid::new_v4().simple(),
            file_name
        ));

        tokio::fs::write(&temp, data)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StorageError::io(key, e));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        debug!(bucket = %self.bucket, key, "filesystem get");
        tokio::fs::read(&path).await.map_err(|e| self.map_io(key, e))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn list_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.dir.clone();
        let prefix = prefix.to_string();

        let listed = tokio::task::spawn_blocking(move || -> StorageResult<Vec<String>> {
            if !dir.exists() {
                return Ok(Vec::new());
            }

            let mut keys = Vec::new();
            for entry in WalkDir::new(&dir).follow_links(false) {
                let entry = entry.map_err(|e| StorageError::Backend {
                    message: format!("failed to walk {}: {}", dir.display(), e),
                    source: Some(Box::new(e)),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TEMP_MARKER) {
                    continue;
                }

                let Ok(relative) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| StorageError::Backend {
            message: format!("listing task failed: {}", e),
            source: Some(Box::new(e)),
        })?;

        listed
    }

    async fn open(&self, key: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        let path = self.path_for(key)?;
        debug!(bucket = %self.bucket, key, ?range, "filesystem open");

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| self.map_io(key, e))?;

        match range {
            None => Ok(Box::pin(file)),
            Some(range) => {
                let size = file
                    .metadata()
                    .await
                    .map_err(|e| StorageError::io(key, e))?
                    .len();
                let (start, len) = range.resolve(key, size)?;
                file.seek(SeekFrom::Start(start))
                    .await
                    .map_err(|e| StorageError::io(key, e))?;
                Ok(Box::pin(file.take(len)))
            }
        }
    }
}
