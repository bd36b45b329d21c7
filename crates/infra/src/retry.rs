//! Bounded retry for optimistic-concurrency conflicts.

use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{LedgerError, LedgerResult};

/// How a service re-runs an operation whose commit lost a version race.
///
/// Each attempt re-reads its snapshot from scratch. Business-rule failures
/// are returned immediately; only transient errors are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// Operations still running at this instant fail with `Timeout`
    /// before committing anything.
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(2),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            deadline: None,
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fails with `Timeout` once the deadline has passed.
    pub fn ensure_within_deadline(&self, operation: &str) -> LedgerResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LedgerError::Timeout(format!(
                "{operation} did not complete before its deadline"
            ))),
            _ => Ok(()),
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, operation: &str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> LedgerResult<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tries: u32 = 0;
        loop {
            self.ensure_within_deadline(operation)?;
            tries += 1;
            match attempt() {
                Err(err) if err.is_transient() && tries < max_attempts => {
                    let delay = backoff(self.base_backoff, tries);
                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after concurrency conflict"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(operation, attempts = tries, error = %err, "retries exhausted");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped at one second.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(1_000) as u64)
}
