//! Process-local object store

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::store::{validate_key, ByteRange, ObjectReader, ObjectStore, StoreProvider};
use crate::{StorageError, StorageResult};

type Objects = Arc<RwLock<BTreeMap<(String, String), Bytes>>>;

/// In-memory store shared by every bucket handed out from it
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    objects: Objects,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, bucket: &str) -> MemoryStore {
        MemoryStore {
            bucket: bucket.to_string(),
            objects: self.objects.clone(),
        }
    }

    /// Number of objects across all buckets
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl StoreProvider for MemoryBackend {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(self.bucket(bucket))
    }
}

/// One bucket of a [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: String,
    objects: Objects,
}

impl MemoryStore {
    fn entry(&self, key: &str) -> (String, String) {
        (self.bucket.clone(), key.to_string())
    }

    fn load(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .read()
            .get(&self.entry(key))
            .cloned()
            .ok_or_else(|| StorageError::NoSuchKey {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        debug!(bucket = %self.bucket, key, bytes = data.len(), "memory put");
        self.objects
            .write()
            .insert(self.entry(key), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!(bucket = %self.bucket, key, "memory get");
        Ok(self.load(key)?.to_vec())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(&self.entry(key)))
    }

    async fn list_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.objects.read();
        let keys = objects
            .range((self.bucket.clone(), prefix.to_string())..)
            .take_while(|((bucket, key), _)| bucket == &self.bucket && key.starts_with(prefix))
            .map(|((_, key), _)| key.clone())
            .collect();
        Ok(keys)
    }

    async fn open(&self, key: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        debug!(bucket = %self.bucket, key, ?range, "memory open");
        let data = self.load(key)?;

        let body = match range {
            None => data,
            Some(range) => {
                let (start, len) = range.resolve(key, data.len() as u64)?;
                let start = start as usize;
                data.slice(start..start + len as usize)
            }
        };

        Ok(Box::pin(Cursor::new(body)))
    }
}
