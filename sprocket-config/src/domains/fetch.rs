//! Retry settings for storage reads

use serde::{Deserialize, Serialize};
use sprocket_resilience::{BackoffStrategy, RetryPolicy};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Fetch configuration
///
/// The delay starts at `initial_backoff` and doubles after every failed
/// attempt, capped at `max_backoff`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts per object, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_initial_backoff"
    )]
    pub initial_backoff: Duration,

    /// Upper bound for a single delay, in seconds
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_max_backoff"
    )]
    pub max_backoff: Duration,

    /// Treat a missing key as a write that is not visible yet
    #[serde(default = "crate::domains::utils::default_true")]
    pub retry_missing_keys: bool,

    /// Spread delays by ±20%
    #[serde(default = "crate::domains::utils::default_false")]
    pub jitter: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            retry_missing_keys: true,
            jitter: false,
        }
    }
}

impl FetchConfig {
    /// Retry policy used by the fetcher
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_backoff,
            max_delay: self.max_backoff,
            backoff_strategy: BackoffStrategy::doubling(),
            jitter: self.jitter,
        }
    }
}

impl Validatable for FetchConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;

        if self.initial_backoff.is_zero() {
            return Err(self.validation_error("initial_backoff must be greater than 0"));
        }

        if self.max_backoff < self.initial_backoff {
            return Err(self.validation_error(format!(
                "max_backoff ({:?}) must not be shorter than initial_backoff ({:?})",
                self.max_backoff, self.initial_backoff
            )));
        }

        if self.max_attempts == 1 {
            log::warn!("fetch.max_attempts is 1, storage reads will not be retried");
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "fetch"
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}
