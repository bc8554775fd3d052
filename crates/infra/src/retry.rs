//! Bounded retry with backoff for optimistic concurrency conflicts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StockError;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy for version-conflict recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0); the offset is seeded per calling thread
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt; conflicts surface immediately.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay to wait after a failed `attempt` (1-indexed), unseeded.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jittered_delay(attempt, 0)
    }

    /// Like [`RetryPolicy::delay_for_attempt`], with the jitter offset shifted
    /// by `seed` so callers with different seeds back off by different amounts.
    pub fn jittered_delay(&self, attempt: u32, seed: u64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic for a given (attempt, seed) pair.
        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            let bucket = (u64::from(attempt) * 17).wrapping_add(seed) % 100;
            let pseudo_random = bucket as f64 / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// attempt budget is spent.
    ///
    /// `op` receives the 1-indexed attempt number and must re-read whatever
    /// it compares against: each attempt is a fresh read-compute-commit cycle.
    pub fn run<T, F>(&self, operation: &'static str, mut op: F) -> Result<T, StockError>
    where
        F: FnMut(u32) -> Result<T, StockError>,
    {
        let seed = caller_seed();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(StockError::VersionConflict(reason)) => {
                    if !self.should_retry(attempt) {
                        warn!(operation, attempts = attempt, %reason, "giving up after version conflicts");
                        return Err(StockError::ConcurrentUpdateFailure { attempts: attempt });
                    }
                    let delay = self.jittered_delay(attempt, seed);
                    debug!(operation, attempt, ?delay, %reason, "version conflict, retrying");
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn caller_seed() -> u64 {
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let p = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::exponential(5, Duration::from_millis(10), Duration::from_millis(50))
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(50));
    }

    #[test]
    fn jitter_depends_on_the_seed_and_stays_in_range() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(100))
        };
        let delays: Vec<Duration> = (0..10u64).map(|seed| p.jittered_delay(1, seed * 7)).collect();
        assert!(delays.windows(2).any(|w| w[0] != w[1]));
        assert!(delays
            .iter()
            .all(|d| *d >= Duration::from_millis(50) && *d <= Duration::from_millis(150)));
        assert_eq!(p.jittered_delay(1, 3), p.jittered_delay(1, 3));
        assert_eq!(p.delay_for_attempt(2), p.jittered_delay(2, 0));
    }

    #[test]
    fn conflicts_are_retried_until_success() {
        let p = RetryPolicy::fixed(5, Duration::ZERO);
        let mut calls = 0;
        let out = p.run("test", |_| {
            calls += 1;
            if calls < 3 {
                Err(StockError::VersionConflict("stale".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out, Ok(3));
    }

    #[test]
    fn exhaustion_surfaces_concurrent_update_failure() {
        let p = RetryPolicy::fixed(4, Duration::ZERO);
        let out: Result<(), _> = p.run("test", |_| Err(StockError::VersionConflict("stale".into())));
        assert_eq!(out, Err(StockError::ConcurrentUpdateFailure { attempts: 4 }));
    }

    #[test]
    fn other_errors_are_not_retried() {
        let p = RetryPolicy::fixed(5, Duration::ZERO);
        let mut calls = 0;
        let out: Result<(), _> = p.run("test", |_| {
            calls += 1;
            Err(StockError::invalid_state("negative"))
        });
        assert!(matches!(out, Err(StockError::InvalidState(_))));
        assert_eq!(calls, 1);
    }
}
