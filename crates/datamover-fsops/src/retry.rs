//! Bounded retry combinator with a fixed delay.

use std::thread;
use std::time::Duration;

use datamover_config::RetrySettings;
use tracing::debug;

/// Fixed number of attempts separated by a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

/// Last error of a retried operation, with the number of attempts made.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Error returned by the final attempt.
    pub last_error: E,
}

impl RetryPolicy {
    /// Policy making at most `attempts` attempts (at least one).
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Policy from configured retry settings.
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts, Duration::from_millis(settings.delay_ms))
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `operation` until it succeeds, `retry_if` rejects its error, or
    /// attempts are exhausted. The delay is slept between attempts only.
    ///
    /// # Errors
    ///
    /// Returns the last error with the number of attempts made.
    pub fn run<T, E, Op, Pred>(&self, mut operation: Op, retry_if: Pred) -> Result<T, RetryExhausted<E>>
    where
        Op: FnMut(u32) -> Result<T, E>,
        Pred: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(last_error) if attempt >= self.attempts || !retry_if(&last_error) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(_) => {
                    debug!(attempt, max_attempts = self.attempts, "retrying after failure");
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
