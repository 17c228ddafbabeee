// src/services/retry.rs

use log::warn;
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::{MatchError, MatchResult};

/// Something that can block the current thread. Swapped out in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Bounded retries with a linearly growing delay: `base_delay * attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` is used up.
///
/// `op` receives the 1-based attempt number. There is no sleep after the final attempt.
/// Exhaustion is reported as `RetriesExhausted` tagged with `batch`.
pub fn retry_with_backoff<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    batch: usize,
    mut op: F,
) -> MatchResult<T>
where
    F: FnMut(u32) -> MatchResult<T>,
{
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "Batch {}: attempt {}/{} failed: {}",
                    batch, attempt, policy.max_attempts, e
                );
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    sleeper.sleep(policy.delay_for(attempt));
                }
            }
        }
    }

    Err(MatchError::RetriesExhausted {
        batch,
        attempts: policy.max_attempts,
        last_error,
    })
}
