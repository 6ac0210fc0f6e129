//! Sprocket job pipeline
//!
//! This crate runs a single job end to end: resilient fetches with doubling
//! backoff, materialization of the task's module tree, invocation of the
//! script callable, two-tier outcome encoding and the stats file.

pub mod encoding;
pub mod fetch;
pub mod materialize;
pub mod runner;
pub mod stats;

// Re-export main types
pub use encoding::{decode_outcome, encode, encode_unreported, EncodeError, EncodedOutcome};
pub use fetch::{AttemptError, BackoffFetcher, FetchError, FetchStats, Fetched};
pub use materialize::{materialize, MaterializeError};
pub use runner::{JobError, JobReport, JobRunner};
pub use stats::{StatRecorder, StatsError};
