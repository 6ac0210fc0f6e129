//! Resilience patterns for Sprocket
//!
//! Storage reads in the job runner are retried with a bounded number of
//! attempts and a growing delay between them. This crate holds the backoff
//! arithmetic and the executor that drives the retry loop.

pub mod backoff;
pub mod retry;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, RetryStats, Retryable};
