//! Bounded retry with a constant, interruptible delay between attempts.

use crate::cancel::CancelToken;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed; `last` is the final attempt's error.
    #[error("{last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The token was cancelled before the operation could succeed.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Up to `attempts` calls with `delay` before every call after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// `attempts` is clamped to at least 1.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Call `op` (with the 1-based attempt number) until it succeeds or attempts run out.
    ///
    /// `on_failure` sees each failed attempt before the wait for the next one.
    /// Cancellation is checked before every attempt and ends a pending delay early.
    pub fn run<T, E, F, N>(
        &self,
        cancel: &CancelToken,
        mut on_failure: N,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Result<T, E>,
        N: FnMut(u32, &E),
    {
        let mut last = None;
        for attempt in 1..=self.attempts {
            if attempt > 1 && !cancel.sleep(self.delay) {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if cancel.is_cancelled() {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                    on_failure(attempt, &e);
                    last = Some(e);
                }
            }
        }
        match last {
            Some(last) => Err(RetryError::Exhausted {
                attempts: self.attempts,
                last,
            }),
            // attempts >= 1, so the loop ran and recorded a failure.
            None => Err(RetryError::Cancelled { attempts: 0 }),
        }
    }
}
