//! Whole-attempt retry on lock contention.

use std::future::Future;
use std::time::Duration;

use crate::core::observer::{Event, Observer};
use crate::error::{Result, SnapshotError};

/// Default number of attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How often, and how far apart, a locked attempt is re-run.
///
/// `max_retries` counts every attempt including the first. A lock error on
/// the last attempt ends the run without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// A policy of at least one attempt.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` until it succeeds, fails with a non-lock error, or the
    /// attempts run out. Returns the value and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, observer: &dyn Observer, mut attempt: F) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut n = 0;
        loop {
            n += 1;
            match attempt(n).await {
                Ok(value) => return Ok((value, n)),
                Err(e) if e.is_locked() => {
                    if n >= self.max_retries {
                        return Err(SnapshotError::RetriesExhausted {
                            attempts: n,
                            last_error: Box::new(e),
                        });
                    }
                    observer.on_event(&Event::AttemptLocked {
                        attempt: n,
                        max_attempts: self.max_retries,
                        delay: self.delay,
                        message: e.to_string(),
                    });
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
