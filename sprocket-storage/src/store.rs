//! Core object store traits and types

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::{StorageError, StorageResult};

/// Streaming body of an object, or of a byte range of it
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Inclusive byte range, as in an HTTP `Range: bytes=start-end` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Offset and length of this range within an object of `size` bytes
    ///
    /// The end is clamped to the last byte; a start past the end is an error.
    pub fn resolve(&self, key: &str, size: u64) -> StorageResult<(u64, u64)> {
        if self.start >= size || self.end < self.start {
            return Err(StorageError::InvalidRange {
                key: key.to_string(),
                start: self.start,
                size,
            });
        }
        let last = self.end.min(size - 1);
        Ok((self.start, last - self.start + 1))
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self::new(start, end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// One bucket of a blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store reads from and writes to
    fn bucket(&self) -> &str;

    /// Store `data` under `key`, replacing any previous object
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Whole object; [`StorageError::NoSuchKey`] when absent
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Keys starting with `prefix`, sorted
    async fn list_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Streaming read of the object, optionally restricted to `range`
    async fn open(&self, key: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader>;
}

/// Hands out a store per bucket
pub trait StoreProvider: Send + Sync {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore>;
}

impl<P: StoreProvider + ?Sized> StoreProvider for Arc<P> {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        (**self).store(bucket)
    }
}

/// Reject keys that could not round-trip through every backend
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.starts_with('/') {
        Some("key starts with '/'")
    } else if key.split('/').any(|part| part == "..") {
        Some("key contains a '..' segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
