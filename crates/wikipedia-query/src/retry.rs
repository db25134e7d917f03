//! Bounded retries with exponential backoff and jitter.

use crate::config::EngineConfig;
use crate::error::Error;
use std::time::{Duration, Instant};

/// Waits between attempts, replaceable so tests don't have to
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        RetryPolicy {
            attempts: config.retry_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// The wait after failed attempt number `attempt` (1-based): the base delay doubled
    /// per attempt, capped, plus up to half of that again as jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);

        let delay = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        let jitter = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);

        delay.saturating_add(Duration::from_millis(fastrand::u64(0..=jitter)))
    }

    /// A provider supplied retry-after wins over the computed backoff
    pub fn delay_for(&self, error: &Error, attempt: u32) -> Duration {
        error
            .retry_after()
            .unwrap_or_else(|| self.backoff(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Runs one logical attempt until it succeeds, fails terminally, runs out of
/// attempts or runs into the deadline
pub struct RetryController {
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        RetryController { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// # Errors
    ///
    /// Terminal errors from `operation` as they are, [`Error::Exhausted`] wrapping the last
    /// retryable error once every attempt is used, [`Error::Timeout`] when the deadline
    /// passes or the next wait would overrun it.
    pub fn run<T>(
        &self,
        deadline: Option<Instant>,
        mut operation: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut attempt = 1;

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(Error::Timeout);
            }

            let error = match operation() {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => error,
            };

            if attempt >= self.policy.attempts {
                log::warn!("Giving up after {attempt} attempts: {error}");

                return Err(Error::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(&error, attempt);

            if let Some(deadline) = deadline {
                let overruns = Instant::now()
                    .checked_add(delay)
                    .is_none_or(|wake| wake > deadline);

                if overruns {
                    log::warn!("Abandoning retry, waiting {delay:?} would pass the deadline");

                    return Err(Error::Timeout);
                }
            }

            log::warn!("Attempt {attempt} failed ({error}), retrying in {delay:?}");

            self.sleeper.sleep(delay);

            attempt += 1;
        }
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Box::new(ThreadSleeper))
    }
}
