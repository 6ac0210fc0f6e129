//! The job pipeline
//!
//! Stages run in order: fetch task package, materialize its modules,
//! deserialize the callable, fetch the input, invoke. Whatever happens in
//! those stages ends up as an [`ExecutionOutcome`] that is encoded and
//! uploaded. Only the stats file, the fallback encoding and the final
//! upload can fail a run.

use futures::FutureExt;
use serde_json::Value as JsonValue;
use sprocket_config::{FetchConfig, JobConfig};
use sprocket_core::{ExecutionOutcome, FaultRecord};
use sprocket_js::{deserialize, ResolutionContext, TaskPackage};
use sprocket_storage::{ByteRange, StorageError, StoreProvider};
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::encoding::{encode, encode_unreported, EncodeError};
use crate::fetch::{BackoffFetcher, Fetched};
use crate::materialize::materialize;
use crate::stats::{StatRecorder, StatsError};

/// Failures that stop a job without a regular outcome
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Failed to upload outcome to {bucket}/{key}: {source}")]
    Upload {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Job pipeline panicked: {0}")]
    Panicked(String),
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub success: bool,
    pub encoding_degraded: bool,
    pub output_bytes: usize,
    pub search_path: Vec<String>,
}

/// Runs one job against the stores handed out by `P`
pub struct JobRunner<P> {
    provider: P,
    fetcher: BackoffFetcher,
}

impl<P: StoreProvider> JobRunner<P> {
    pub fn new(provider: P, fetch: &FetchConfig) -> Self {
        Self::with_fetcher(provider, BackoffFetcher::new(fetch))
    }

    pub fn with_fetcher(provider: P, fetcher: BackoffFetcher) -> Self {
        Self { provider, fetcher }
    }

    pub async fn run(&self, job: &JobConfig) -> Result<JobReport, JobError> {
        let mut stats = StatRecorder::create(&job.stats_filename)?;
        let unreported = encode_unreported()?;

        let mut resolution = ResolutionContext::new();

        let outcome = match AssertUnwindSafe(self.execute(job, &mut resolution, &mut stats))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Job pipeline panicked: {}", message);
                self.upload(job, &unreported).await?;
                return Err(JobError::Panicked(message));
            }
        };

        let encoded = match encode(&outcome) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Outcome could not be encoded: {}", e);
                self.upload(job, &unreported).await?;
                return Err(e.into());
            }
        };

        let upload_started = Instant::now();
        self.upload(job, &encoded.bytes).await?;
        stats.record_duration("output_upload_time", upload_started.elapsed());

        info!(
            "Job finished: success={}, degraded={}",
            outcome.is_success(),
            encoded.degraded
        );
        if let Err(e) = stats.finish() {
            warn!("{}", e);
        }

        Ok(JobReport {
            success: outcome.is_success(),
            encoding_degraded: encoded.degraded,
            output_bytes: encoded.bytes.len(),
            search_path: outcome.search_path().to_vec(),
        })
    }

    async fn execute(
        &self,
        job: &JobConfig,
        resolution: &mut ResolutionContext,
        stats: &mut StatRecorder,
    ) -> ExecutionOutcome {
        match self.stages(job, resolution, stats).await {
            Ok(value) => ExecutionOutcome::success(value, resolution.snapshot()),
            Err(fault) => {
                warn!("Job failed with {}", fault.error_kind);
                ExecutionOutcome::failure(fault, resolution.snapshot())
            }
        }
    }

    async fn stages(
        &self,
        job: &JobConfig,
        resolution: &mut ResolutionContext,
        stats: &mut StatRecorder,
    ) -> Result<JsonValue, FaultRecord> {
        let func_store = self.provider.store(&job.func_bucket);
        let package: Fetched<JsonValue> = self
            .fetcher
            .fetch(func_store, &job.func_key, None)
            .await
            .map_err(|e| e.into_fault_record())?;
        package.stats.record(stats, "func");

        let package: TaskPackage = serde_json::from_value(package.payload).map_err(|e| {
            let e = sprocket_js::DeserializationError::from(e);
            FaultRecord::from_error("DeserializationError", &e)
        })?;

        materialize(&package.dependencies, &job.module_path)
            .await
            .map_err(|e| FaultRecord::from_error("MaterializeError", &e))?;
        resolution.push_root(&job.module_path);

        info!("Deserializing callable");
        let callable = deserialize(&package.callable, resolution)
            .map_err(|e| FaultRecord::from_error("DeserializationError", &e))?;

        let data_store = self.provider.store(&job.data_bucket);
        let data: Fetched<JsonValue> = self
            .fetcher
            .fetch(
                data_store,
                &job.data_key,
                job.data_byte_range.map(ByteRange::from),
            )
            .await
            .map_err(|e| e.into_fault_record())?;
        data.stats.record(stats, "data");

        callable
            .invoke(&data.payload)
            .map_err(|e| e.into_fault_record())
    }

    async fn upload(&self, job: &JobConfig, bytes: &[u8]) -> Result<(), JobError> {
        info!(
            "Uploading outcome to {}/{} ({} bytes)",
            job.output_bucket,
            job.output_key,
            bytes.len()
        );
        self.provider
            .store(&job.output_bucket)
            .put(&job.output_key, bytes)
            .await
            .map_err(|source| JobError::Upload {
                bucket: job.output_bucket.clone(),
                key: job.output_key.clone(),
                source,
            })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
