//! Retry strategy abstraction for transient read failures.

use std::time::Duration;

use crate::config::retry as retry_config;

/// Trait for defining retry strategies.
///
/// Implementations define how many attempts to make and how long to wait
/// after each failed attempt.
pub trait RetryStrategy {
    /// Maximum number of attempts (at least one is always made).
    fn max_attempts(&self) -> u32;

    /// Delay after the given failed attempt (0-indexed).
    fn delay_for_attempt(&self, attempt: u32) -> Option<Duration>;

    /// Calls `f` up to `max_attempts()` times, sleeping `delay_for_attempt()`
    /// between failed attempts. Returns the last error if all attempts fail.
    fn execute<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let max = self.max_attempts().max(1);
        let mut attempt = 0;

        loop {
            match f(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= max => return Err(e),
                Err(_) => {
                    if let Some(delay) = self.delay_for_attempt(attempt) {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Exponential backoff using the delays from `config::retry`.
#[derive(Debug, Clone, Default)]
pub struct ExponentialBackoff;

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        retry_config::MAX_READ_RETRIES
    }

    fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        retry_config::RETRY_DELAYS_MS
            .get(attempt as usize)
            .map(|&ms| Duration::from_millis(ms))
    }
}

/// Same delay after every failed attempt.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl RetryStrategy for FixedDelay {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        (attempt + 1 < self.attempts).then_some(self.delay)
    }
}

/// Attempt once and return the result.
#[derive(Debug, Clone, Default)]
pub struct NoRetry;

impl NoRetry {
    pub fn new() -> Self {
        Self
    }
}

impl RetryStrategy for NoRetry {
    fn max_attempts(&self) -> u32 {
        1
    }

    fn delay_for_attempt(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}
