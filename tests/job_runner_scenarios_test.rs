//! End-to-end job runs against an in-memory store

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sprocket_config::{FetchConfig, JobConfig};
use sprocket_core::{CausalChain, OutcomeRecord};
use sprocket_execution::{decode_outcome, BackoffFetcher, JobError, JobRunner};
use sprocket_js::{CallableSpec, TaskPackage};
use sprocket_resilience::RetryPolicy;
use sprocket_storage::{
    ByteRange, MemoryBackend, ObjectReader, ObjectStore, StorageError, StorageResult, StoreProvider,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DATA_BUCKET: &str = "data";
const OUTPUT_BUCKET: &str = "results";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sprocket=debug")
        .with_test_writer()
        .try_init();
}

/// Store that fails the first `timeouts` reads and, optionally, every write
struct FlakyStore {
    inner: Arc<dyn ObjectStore>,
    timeouts: Arc<AtomicU32>,
    reject_writes: bool,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        if self.reject_writes {
            return Err(StorageError::Backend {
                message: format!("bucket {} is read-only", self.bucket()),
                source: None,
            });
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn list_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list_with_prefix(prefix).await
    }

    async fn open(&self, key: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        let remaining = self.timeouts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.timeouts.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Timeout {
                key: key.to_string(),
            });
        }
        self.inner.open(key, range).await
    }
}

/// Provider injecting read timeouts on the data bucket
struct FaultInjectingProvider {
    backend: MemoryBackend,
    data_timeouts: Arc<AtomicU32>,
    reject_output: bool,
}

impl FaultInjectingProvider {
    fn new(backend: MemoryBackend, data_timeouts: u32) -> Self {
        Self {
            backend,
            data_timeouts: Arc::new(AtomicU32::new(data_timeouts)),
            reject_output: false,
        }
    }
}

impl StoreProvider for FaultInjectingProvider {
    fn store(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        let timeouts = if bucket == DATA_BUCKET {
            Arc::clone(&self.data_timeouts)
        } else {
            Arc::new(AtomicU32::new(0))
        };
        Arc::new(FlakyStore {
            inner: self.backend.store(bucket),
            timeouts,
            reject_writes: self.reject_output && bucket == OUTPUT_BUCKET,
        })
    }
}

struct Fixture {
    dir: TempDir,
    backend: MemoryBackend,
}

impl Fixture {
    async fn new(spec: CallableSpec, input: JsonValue) -> Result<Self> {
        let backend = MemoryBackend::new();
        let package = TaskPackage::build(&spec, Vec::new())?;

        backend
            .store("funcs")
            .put("task-0", &serde_json::to_vec(&package)?)
            .await?;
        backend
            .store(DATA_BUCKET)
            .put("chunk-0", &serde_json::to_vec(&input)?)
            .await?;

        Ok(Self {
            dir: TempDir::new()?,
            backend,
        })
    }

    fn job(&self) -> JobConfig {
        JobConfig {
            func_bucket: "funcs".to_string(),
            func_key: "task-0".to_string(),
            data_bucket: DATA_BUCKET.to_string(),
            data_key: "chunk-0".to_string(),
            data_byte_range: None,
            output_bucket: OUTPUT_BUCKET.to_string(),
            output_key: "outcome-0".to_string(),
            module_path: self.dir.path().join("modules"),
            stats_filename: self.dir.path().join("stats.txt"),
        }
    }

    async fn outcome(&self) -> Result<OutcomeRecord> {
        let bytes = self.backend.store(OUTPUT_BUCKET).get("outcome-0").await?;
        Ok(decode_outcome(&bytes)?)
    }

    fn stats(&self) -> Result<BTreeMap<String, String>> {
        let contents = std::fs::read_to_string(self.dir.path().join("stats.txt"))?;
        Ok(contents
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

#[tokio::test]
async fn test_increment_succeeds() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { return x + 1; }"), json!(41)).await?;

    let runner = JobRunner::new(fixture.backend.clone(), &FetchConfig::default());
    let report = runner.run(&fixture.job()).await?;
    assert!(report.success);
    assert!(!report.encoding_degraded);

    let record = fixture.outcome().await?;
    assert!(record.success);
    assert_eq!(record.result, Some(json!(42)));

    let stats = fixture.stats()?;
    for name in [
        "func_num_tries",
        "func_num_timeouts",
        "func_total_time",
        "data_num_tries",
        "data_num_timeouts",
        "data_total_time",
        "output_upload_time",
    ] {
        assert!(stats.contains_key(name), "missing stat {name}");
    }
    assert_eq!(stats["func_num_tries"], "1.000000");
    assert_eq!(stats["data_num_timeouts"], "0.000000");
    Ok(())
}

#[tokio::test]
async fn test_task_returning_nothing_is_a_plain_success() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { var y = x + 1; }"), json!(41)).await?;

    let report = JobRunner::new(fixture.backend.clone(), &FetchConfig::default())
        .run(&fixture.job())
        .await?;
    assert!(report.success);
    assert!(!report.encoding_degraded);

    let record = fixture.outcome().await?;
    assert!(!record.encoding_degraded);
    assert_eq!(record.result, Some(JsonValue::Null));
    assert!(record.encoding_error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_thrown_null_keeps_structured_value() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { throw null; }"), json!(41)).await?;

    let report = JobRunner::new(fixture.backend.clone(), &FetchConfig::default())
        .run(&fixture.job())
        .await?;
    assert!(!report.success);
    assert!(!report.encoding_degraded);

    let record = fixture.outcome().await?;
    assert!(!record.encoding_degraded);
    assert_eq!(record.error_value, Some(JsonValue::Null));
    assert!(matches!(record.causal_chain, Some(CausalChain::Frames(_))));
    Ok(())
}

#[tokio::test]
async fn test_float_result_is_delivered_exactly() -> Result<()> {
    init_tracing();
    let input = json!(-1.4427572760105764e-59);
    let fixture = Fixture::new(CallableSpec::new("function main(x) { return x * 1; }"), input.clone()).await?;

    let report = JobRunner::new(fixture.backend.clone(), &FetchConfig::default())
        .run(&fixture.job())
        .await?;
    assert!(report.success);
    assert!(!report.encoding_degraded);
    assert_eq!(fixture.outcome().await?.result, Some(input));
    Ok(())
}

#[tokio::test]
async fn test_division_by_zero_is_reported_with_chain() -> Result<()> {
    init_tracing();
    let spec = CallableSpec::new("function main(x) { return Number(BigInt(x) / 0n); }");
    let fixture = Fixture::new(spec, json!(41)).await?;

    let runner = JobRunner::new(fixture.backend.clone(), &FetchConfig::default());
    let report = runner.run(&fixture.job()).await?;
    assert!(!report.success);

    let record = fixture.outcome().await?;
    assert!(!record.success);
    assert!(!record.encoding_degraded);
    assert_eq!(record.error_kind.as_deref(), Some("RangeError"));
    assert!(record.error_value.is_some());
    match record.causal_chain {
        Some(CausalChain::Frames(frames)) => {
            assert!(!frames.is_empty());
            assert_eq!(frames[0].function, "RangeError");
        }
        other => panic!("expected structured frames, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_data_timeouts_are_retried() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { return x + 1; }"), json!(41)).await?;
    let provider = FaultInjectingProvider::new(fixture.backend.clone(), 4);

    let fetcher = BackoffFetcher::from_policy(
        RetryPolicy::doubling(5, Duration::from_millis(200), Duration::from_secs(30)),
        true,
    );
    let report = JobRunner::with_fetcher(provider, fetcher)
        .run(&fixture.job())
        .await?;
    assert!(report.success);

    let stats = fixture.stats()?;
    assert_eq!(stats["data_num_tries"], "5.000000");
    assert_eq!(stats["data_num_timeouts"], "4.000000");
    assert_eq!(stats["func_num_timeouts"], "0.000000");

    let data_time: f64 = stats["data_total_time"].parse()?;
    assert!(data_time >= 3.0, "waited {data_time}s");

    assert_eq!(fixture.outcome().await?.result, Some(json!(42)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_become_a_failure() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { return x; }"), json!(1)).await?;
    let provider = FaultInjectingProvider::new(fixture.backend.clone(), 10);

    let report = JobRunner::new(provider, &FetchConfig::default())
        .run(&fixture.job())
        .await?;
    assert!(!report.success);

    let record = fixture.outcome().await?;
    assert_eq!(record.error_kind.as_deref(), Some("RetryExhausted"));
    assert!(!fixture.stats()?.contains_key("data_num_tries"));
    Ok(())
}

#[tokio::test]
async fn test_unencodable_fault_degrades_to_text() -> Result<()> {
    init_tracing();
    let spec = CallableSpec::new(
        "function main(x) { var o = { input: x }; o.self = o; throw o; }",
    );
    let fixture = Fixture::new(spec, json!(41)).await?;

    let report = JobRunner::new(fixture.backend.clone(), &FetchConfig::default())
        .run(&fixture.job())
        .await?;
    assert!(!report.success);
    assert!(report.encoding_degraded);

    let record = fixture.outcome().await?;
    assert!(record.encoding_degraded);
    assert!(record.result.is_none());
    assert!(matches!(record.error_value, Some(JsonValue::String(_))));
    assert!(matches!(record.causal_chain, Some(CausalChain::Text(_))));
    assert!(record.encoding_error.is_some());
    Ok(())
}

#[tokio::test]
async fn test_upload_failure_is_fatal() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(CallableSpec::new("function main(x) { return x; }"), json!(1)).await?;
    let mut provider = FaultInjectingProvider::new(fixture.backend.clone(), 0);
    provider.reject_output = true;

    let err = JobRunner::new(provider, &FetchConfig::default())
        .run(&fixture.job())
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Upload { .. }));
    Ok(())
}

#[tokio::test]
async fn test_data_byte_range_selects_chunk() -> Result<()> {
    init_tracing();
    let fixture = Fixture::new(
        CallableSpec::new("function main(rows) { return rows.reduce(function (a, b) { return a + b; }, 0); }"),
        json!(null),
    )
    .await?;
    fixture
        .backend
        .store(DATA_BUCKET)
        .put("chunk-0", b"[1,2,3][10,20,12]")
        .await?;

    let mut job = fixture.job();
    job.data_byte_range = Some((7, 16));

    let report = JobRunner::new(fixture.backend.clone(), &FetchConfig::default())
        .run(&job)
        .await?;
    assert!(report.success);
    assert_eq!(fixture.outcome().await?.result, Some(json!(42)));
    Ok(())
}
