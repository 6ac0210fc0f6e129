//! Resilient retrieval of JSON objects from the blob store

use serde::de::DeserializeOwned;
use serde_json::error::Category;
use sprocket_config::FetchConfig;
use sprocket_core::FaultRecord;
use sprocket_resilience::{RetryError, RetryExecutor, RetryPolicy, Retryable};
use sprocket_storage::{is_transient_io, ByteRange, ObjectStore, StorageError};
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info};

use crate::stats::StatRecorder;

/// Why a single attempt failed
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Missing key treated as a write that has not propagated yet
    #[error("{0} (not visible yet)")]
    NotVisible(#[source] StorageError),

    #[error("Failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Decoder task failed: {0}")]
    DecoderTask(String),
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Storage(e) => e.is_retryable(),
            AttemptError::NotVisible(_) => true,
            // Complete but corrupt documents are final
            AttemptError::Decode(e) => match e.classify() {
                Category::Eof => true,
                Category::Io => e.io_error_kind().is_some_and(is_transient_io),
                Category::Syntax | Category::Data => false,
            },
            AttemptError::DecoderTask(_) => false,
        }
    }

    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Retry limit exceeded for {key} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        key: String,
        attempts: u32,
        #[source]
        last_error: AttemptError,
    },

    #[error("Failed to fetch {key}: {source}")]
    Failed {
        key: String,
        #[source]
        source: AttemptError,
    },
}

impl FetchError {
    fn from_retry(key: &str, error: RetryError<AttemptError>) -> Self {
        match error {
            RetryError::MaxAttemptsExceeded {
                attempts,
                last_error,
            } => FetchError::RetryExhausted {
                key: key.to_string(),
                attempts,
                last_error,
            },
            RetryError::NonRetryableError(source) => FetchError::Failed {
                key: key.to_string(),
                source,
            },
        }
    }

    /// Fault kind reported in the outcome
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RetryExhausted { .. } => "RetryExhausted",
            FetchError::Failed {
                source: AttemptError::Decode(_),
                ..
            } => "DecodeError",
            FetchError::Failed { .. } => "StorageError",
        }
    }

    pub fn into_fault_record(self) -> FaultRecord {
        FaultRecord::from_error(self.kind(), &self)
    }
}

/// Retrieval statistics of one successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    /// Attempts made, at least one
    pub attempts: u32,
    /// Failed attempts that were retried
    pub timeouts: u32,
    pub elapsed: Duration,
}

impl FetchStats {
    /// Write `<prefix>_num_tries`, `<prefix>_num_timeouts` and `<prefix>_total_time`
    pub fn record(&self, recorder: &mut StatRecorder, prefix: &str) {
        recorder.record(&format!("{}_num_tries", prefix), f64::from(self.attempts));
        recorder.record(&format!("{}_num_timeouts", prefix), f64::from(self.timeouts));
        recorder.record_duration(&format!("{}_total_time", prefix), self.elapsed);
    }
}

/// A decoded payload together with how it was obtained
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub payload: T,
    pub stats: FetchStats,
}

/// Fetches and decodes objects under bounded retry with doubling backoff
#[derive(Debug, Clone)]
pub struct BackoffFetcher {
    executor: RetryExecutor,
    retry_missing_keys: bool,
}

impl BackoffFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self::from_policy(config.retry_policy(), config.retry_missing_keys)
    }

    pub fn from_policy(policy: RetryPolicy, retry_missing_keys: bool) -> Self {
        Self {
            executor: RetryExecutor::new(policy),
            retry_missing_keys,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    /// Stream `key` (or a byte range of it) through the JSON decoder
    ///
    /// Incomplete streams, transport timeouts and, when enabled, missing
    /// keys are retried. Any other failure is returned immediately.
    pub async fn fetch<T>(
        &self,
        store: Arc<dyn ObjectStore>,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Fetched<T>, FetchError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match range {
            Some(range) => info!("Fetching {}/{} ({})", store.bucket(), key, range),
            None => info!("Fetching {}/{}", store.bucket(), key),
        }

        let result = self
            .executor
            .execute_with_stats(|attempt| {
                let store = Arc::clone(&store);
                async move {
                    debug!("Fetch attempt {} for {}", attempt, key);
                    self.fetch_once::<T>(store.as_ref(), key, range).await
                }
            })
            .await;

        match result {
            Ok((payload, stats)) => {
                let stats = FetchStats {
                    attempts: stats.attempts,
                    timeouts: stats.transient_failures,
                    elapsed: stats.elapsed,
                };
                debug!(
                    "Fetched {} in {} attempt(s), {:?}",
                    key, stats.attempts, stats.elapsed
                );
                Ok(Fetched { payload, stats })
            }
            Err(e) => Err(FetchError::from_retry(key, e)),
        }
    }

    async fn fetch_once<T>(
        &self,
        store: &dyn ObjectStore,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<T, AttemptError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let reader = store.open(key, range).await.map_err(|e| {
            if self.retry_missing_keys && e.is_not_found() {
                AttemptError::NotVisible(e)
            } else {
                AttemptError::Storage(e)
            }
        })?;

        // The decoder pulls bytes as they arrive; the object is never buffered whole
        let bridge = SyncIoBridge::new(reader);
        tokio::task::spawn_blocking(move || serde_json::from_reader::<_, T>(BufReader::new(bridge)))
            .await
            .map_err(|e| AttemptError::DecoderTask(e.to_string()))?
            .map_err(AttemptError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};
    use sprocket_storage::{MemoryBackend, StoreProvider};

    fn fetcher(max_attempts: u32, retry_missing_keys: bool) -> BackoffFetcher {
        BackoffFetcher::from_policy(
            RetryPolicy::doubling(
                max_attempts,
                Duration::from_millis(100),
                Duration::from_secs(30),
            ),
            retry_missing_keys,
        )
    }

    #[tokio::test]
    async fn test_fetch_decodes_payload() {
        let backend = MemoryBackend::new();
        let store = backend.store("data");
        store.put("chunk", br#"{"values": [1, 2, 3]}"#).await.unwrap();

        let fetched: Fetched<JsonValue> = fetcher(3, true).fetch(store, "chunk", None).await.unwrap();
        assert_eq!(fetched.payload, json!({"values": [1, 2, 3]}));
        assert_eq!(fetched.stats.attempts, 1);
        assert_eq!(fetched.stats.timeouts, 0);
    }

    #[tokio::test]
    async fn test_fetch_byte_range() {
        let backend = MemoryBackend::new();
        let store = backend.store("data");
        store.put("rows", b"[1,2][3,4]").await.unwrap();

        let fetched: Fetched<Vec<u32>> = fetcher(3, true)
            .fetch(store, "rows", Some(ByteRange::new(5, 9)))
            .await
            .unwrap();
        assert_eq!(fetched.payload, vec![3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_document_is_retried_until_exhausted() {
        let backend = MemoryBackend::new();
        let store = backend.store("data");
        store.put("partial", br#"{"values": [1, 2"#).await.unwrap();

        let err = fetcher(3, true)
            .fetch::<JsonValue>(store, "partial", None)
            .await
            .unwrap_err();

        match &err {
            FetchError::RetryExhausted { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), "RetryExhausted");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_not_retried() {
        let backend = MemoryBackend::new();
        let store = backend.store("data");
        store.put("corrupt", b"{\"values\": nope}").await.unwrap();

        let err = fetcher(5, true)
            .fetch::<JsonValue>(store, "corrupt", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Failed {
                source: AttemptError::Decode(_),
                ..
            }
        ));
        assert_eq!(err.kind(), "DecodeError");
    }

    #[tokio::test]
    async fn test_missing_key_without_retry() {
        let backend = MemoryBackend::new();
        let err = fetcher(5, false)
            .fetch::<JsonValue>(backend.store("data"), "absent", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "StorageError");
        let record = err.into_fault_record();
        assert_eq!(record.error_kind, "StorageError");
        assert!(record.causal_chain.len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_becomes_visible() {
        let backend = MemoryBackend::new();
        let store = backend.store("data");

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                store.put("late", b"7").await.unwrap();
            })
        };

        let fetched: Fetched<u32> = fetcher(5, true).fetch(store, "late", None).await.unwrap();
        writer.await.unwrap();

        assert_eq!(fetched.payload, 7);
        assert_eq!(fetched.stats.attempts, 3);
        assert_eq!(fetched.stats.timeouts, 2);
    }
}
