//! Batch Executor.
//!
//! Provides:
//! - [`executor::BatchExecutor`]: chunked, bounded-concurrency execution with retry rounds
//! - [`operation::MigrationOperation`]: the per-item migration seam, with a command-backed implementation
//! - [`report::BatchReport`]: run summary and Ok/Warning/Error classification

pub mod executor;
pub mod operation;
pub mod report;

use std::time::Duration;

pub use executor::BatchExecutor;
pub use operation::{CommandMigrationOperation, MigrationOperation};
pub use report::{BatchReport, ItemFailure, PassSummary, RunClassification};

/// Pause before each retry round. Every round retries all items still failing.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryBackoff {
    Fixed(Duration),
    /// `initial * factor^(round - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl RetryBackoff {
    /// Delay before retry round `round` (1-based).
    pub fn delay_for(&self, round: u32) -> Duration {
        match self {
            RetryBackoff::Fixed(delay) => *delay,
            RetryBackoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = round.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

/// Executor settings. Built from `[batch]` in the config file.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items processed concurrently per chunk.
    pub batch_size: usize,
    /// Retry rounds after the first pass.
    pub retry_count: u32,
    /// Pause between chunks of the same pass.
    pub batch_delay: Duration,
    pub backoff: RetryBackoff,
    /// Upper bound for a single migration attempt.
    pub item_timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_count: 3,
            batch_delay: Duration::from_secs(5),
            backoff: RetryBackoff::Fixed(Duration::from_secs(30)),
            item_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff_is_flat() {
        let backoff = RetryBackoff::Fixed(Duration::from_secs(30));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(30));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let backoff = RetryBackoff::Exponential {
            initial: Duration::from_secs(30),
            factor: 2.0,
            max: Duration::from_secs(100),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_secs(30));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(100));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(100));
    }
}
