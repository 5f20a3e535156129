// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded polling with a fixed interval.
//!
//! Kernel drivers are frequently slow to react to configuration changes (a freshly created
//! VF takes a while to show up as a netdev, an MTU write may be refused while the PF is
//! still busy re-creating VFs).  Every wait of that kind goes through a [`RetryPolicy`] so
//! that the number of attempts and the delay between them are always bounded.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Fixed-interval retry policy.
///
/// An operation is attempted immediately and then again after each `interval` until it
/// succeeds or `max_attempts` attempts have been made.  There is no sleep after the last
/// attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: u32,
}

/// The error returned once a [`RetryPolicy`] is exhausted.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryError<E: std::error::Error + 'static> {
    pub attempts: u32,
    #[source]
    pub last: E,
}

impl RetryPolicy {
    /// Policy for writing the MTU of a netdev.
    pub const MTU_WRITE: RetryPolicy = RetryPolicy::new(Duration::from_secs(1), 10);
    /// Policy for waiting on a VF netdev to appear.
    pub const VF_READY: RetryPolicy = RetryPolicy::new(Duration::from_secs(1), 10);

    /// Create a new policy.  A `max_attempts` of zero is treated as one.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            interval,
            max_attempts,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it returns `Ok` or the policy is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, wrapped in a [`RetryError`], if no attempt
    /// succeeded.
    pub async fn retry<T, E, F, Fut>(&self, what: impl Display, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= self.max_attempts => {
                    return Err(RetryError {
                        attempts: attempt,
                        last,
                    });
                }
                Err(e) => {
                    debug!("{what}: attempt {attempt}/{} failed: {e}", self.max_attempts);
                }
            }
            attempt += 1;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Evaluate `check` until it returns true or the policy is exhausted.
    ///
    /// Returns whether the condition was eventually met.
    pub async fn poll<F, Fut>(&self, what: impl Display, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            if check().await {
                return true;
            }
            debug!("{what}: not ready after attempt {attempt}/{}", self.max_attempts);
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::RetryPolicy;
    use std::cell::Cell;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug, thiserror::Error)]
    #[error("busy")]
    struct Busy;

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0u32);
        let start = Instant::now();
        let res: Result<(), _> = RetryPolicy::MTU_WRITE
            .retry("mtu", || {
                calls.set(calls.get() + 1);
                async { Err(Busy) }
            })
            .await;
        let err = res.unwrap_err();
        assert_eq!(err.attempts, 10);
        assert_eq!(calls.get(), 10);
        // nine sleeps between ten attempts
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_first_success() {
        let calls = Cell::new(0u32);
        let res = RetryPolicy::new(Duration::from_millis(100), 5)
            .retry("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err(Busy) } else { Ok(n) } }
            })
            .await
            .unwrap();
        assert_eq!(res, 3);
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn poll_reports_timeout() {
        let start = Instant::now();
        let ready = RetryPolicy::VF_READY.poll("vf netdev", || async { false }).await;
        assert!(!ready);
        assert_eq!(start.elapsed(), Duration::from_secs(9));
        assert!(logs_contain("vf netdev: not ready after attempt 10/10"));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_checks_immediately() {
        let start = Instant::now();
        assert!(RetryPolicy::VF_READY.poll("vf netdev", || async { true }).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(Duration::ZERO, 0).max_attempts(), 1);
    }
}
