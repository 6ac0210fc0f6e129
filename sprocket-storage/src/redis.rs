//! Redis-backed object store
//!
//! Every bucket shares one server and one multiplexed connection. Keys are
//! namespaced as `<bucket><separator><key>` and values are stored as raw
//! binary strings, so `get` returns exactly the bytes that `put` stored.

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::store::{validate_key, ByteRange, ObjectReader, ObjectStore, StoreProvider};
use crate::{StorageError, StorageResult};

const SCAN_BATCH: usize = 100;

/// Connection shared by every bucket handed out from it
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    separator: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to the server at `url`
    pub async fn new(url: &str) -> StorageResult<Self> {
        let client = ::redis::Client::open(url).map_err(|e| StorageError::Backend {
            message: format!("failed to create Redis client: {e}"),
            source: Some(Box::new(e)),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("failed to connect to Redis: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self::with_connection(conn))
    }

    /// Wraps a pre-built multiplexed connection
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            separator: "/".to_string(),
        }
    }

    /// Separator placed between bucket and key (builder pattern)
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn bucket(&self, bucket: &str) -> RedisStore {
        RedisStore {
            conn: self.conn.clone(),
            bucket: bucket.to_string(),
            prefix: format!("{}{}", bucket, self.separator),
        }
    }
}

impl StoreProvider for RedisBackend {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(self.bucket(bucket))
    }
}

/// One bucket of a [`RedisBackend`]
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    bucket: String,
    prefix: String,
}

impl RedisStore {
    fn full_key(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("{}{}", self.prefix, key))
    }

    fn no_such_key(&self, key: &str) -> StorageError {
        StorageError::NoSuchKey {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`
fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Maps a Redis error to a [`StorageError`]
fn map_redis_error(err: ::redis::RedisError, key: &str) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout {
            key: key.to_string(),
        }
    } else if err.is_connection_dropped() || err.is_io_error() {
        StorageError::Unavailable {
            message: format!("Redis connection lost for key {key}: {err}"),
            source: Some(Box::new(err)),
        }
    } else {
        StorageError::Backend {
            message: format!("Redis error for key {key}: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

#[async_trait]
impl ObjectStore for RedisStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let full = self.full_key(key)?;
        debug!(key = %full, bytes = data.len(), "redis SET");

        let mut conn = self.conn.clone();
        let _: () = conn
            .set(&full, data)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full = self.full_key(key)?;
        debug!(key = %full, "redis GET");

        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(&full)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        value.ok_or_else(|| self.no_such_key(key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full = self.full_key(key)?;
        debug!(key = %full, "redis EXISTS");

        let mut conn = self.conn.clone();
        let found: bool = conn
            .exists(&full)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(found)
    }

    async fn list_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let pattern = format!("{}*", escape_pattern(&format!("{}{}", self.prefix, prefix)));
        debug!(%pattern, "redis SCAN");

        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(e, prefix))?;

            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|full| full.strip_prefix(&self.prefix).map(str::to_string)),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn open(&self, key: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        let Some(range) = range else {
            let body = self.get(key).await?;
            return Ok(Box::pin(Cursor::new(body)));
        };

        let full = self.full_key(key)?;
        debug!(key = %full, %range, "redis GETRANGE");

        let mut conn = self.conn.clone();
        let size: u64 = ::redis::cmd("STRLEN")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        if size == 0 && !self.exists(key).await? {
            return Err(self.no_such_key(key));
        }

        let (start, len) = range.resolve(key, size)?;
        let body: Vec<u8> = ::redis::cmd("GETRANGE")
            .arg(&full)
            .arg(start)
            .arg(start + len - 1)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, key))?;

        Ok(Box::pin(Cursor::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_pattern() {
        assert_eq!(escape_pattern("jobs/a*b?[c]"), "jobs/a\\*b\\?\\[c\\]");
        assert_eq!(escape_pattern("plain/prefix"), "plain/prefix");
    }
}
