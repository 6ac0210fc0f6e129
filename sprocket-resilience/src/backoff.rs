//! Backoff strategies for retry policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows from one failed attempt to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = initial_delay * base^(attempt-1)
    Exponential {
        /// 2.0 doubles the delay after each failure
        base: f64,
    },
}

impl BackoffStrategy {
    /// Exponential backoff with base 2
    pub fn doubling() -> Self {
        Self::Exponential { base: 2.0 }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::doubling()
    }
}

/// Backoff delay calculator
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(
        strategy: BackoffStrategy,
        initial_delay: Duration,
        max_delay: Duration,
        jitter: bool,
    ) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt).min(self.max_delay);

        if self.jitter {
            apply_jitter(capped)
        } else {
            capped
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let BackoffStrategy::Exponential { base } = &self.strategy;
        let multiplier = base.powi(attempt as i32 - 1);
        let nanos = self.initial_delay.as_nanos() as f64 * multiplier;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();

    // ±20%
    let factor = rng.gen_range(0.8..1.2);
    Duration::from_nanos((delay.as_nanos() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(initial: Duration, max: Duration, jitter: bool) -> BackoffCalculator {
        BackoffCalculator::new(BackoffStrategy::doubling(), initial, max, jitter)
    }

    #[test]
    fn test_doubling_delays() {
        let calc = doubling(Duration::from_millis(200), Duration::from_secs(30), false);

        let delays: Vec<Duration> = (1..=4).map(|attempt| calc.calculate_delay(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
        for pair in delays.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[test]
    fn test_exponential_saturates_at_max_delay() {
        let calc = doubling(Duration::from_millis(200), Duration::from_secs(1), false);

        assert_eq!(calc.calculate_delay(3), Duration::from_millis(800));
        assert_eq!(calc.calculate_delay(4), Duration::from_secs(1));
        assert_eq!(calc.calculate_delay(500), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let calc = doubling(Duration::from_millis(1000), Duration::from_secs(10), true);

        let delay = calc.calculate_delay(1);
        assert!(delay >= Duration::from_millis(800));
        assert!(delay <= Duration::from_millis(1200));
    }

    #[test]
    fn test_strategy_from_json() {
        let strategy: BackoffStrategy =
            serde_json::from_str(r#"{"type": "exponential", "base": 3.0}"#).unwrap();
        assert_eq!(strategy, BackoffStrategy::Exponential { base: 3.0 });
    }
}
