//! [`RetryPolicy`] – a bounded retry combinator.
//!
//! Used wherever an operation against flaky hardware or a remote peer is
//! worth repeating a fixed number of times: clock write verification, remote
//! time fetches and the DHCP-then-fallback link bring-up.

use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Every attempt failed; carries the error from the final attempt.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// How many times to try and how long to pause between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.  Zero is treated as one.
    pub attempts: u32,
    /// Pause between consecutive attempts (not after the last).
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhausted`] with the last error when no attempt
    /// succeeded.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use orc_kernel::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3, Duration::ZERO);
    /// let out = policy.run(|n| if n < 3 { Err(n) } else { Ok("third") });
    /// assert_eq!(out.unwrap(), "third");
    ///
    /// let err = policy.run(|n| Err::<(), _>(n)).unwrap_err();
    /// assert_eq!((err.attempts, err.last), (3, 3));
    /// ```
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, RetryExhausted<E>> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= attempts => {
                    return Err(RetryExhausted { attempts, last });
                }
                Err(_) => {
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn first_success_stops_retrying() {
        let mut calls = 0;
        let out: Result<u32, RetryExhausted<&str>> =
            RetryPolicy::new(5, Duration::ZERO).run(|_| {
                calls += 1;
                Ok(42)
            });
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhaustion_reports_attempts_and_last_error() {
        let err = RetryPolicy::new(4, Duration::ZERO)
            .run(|n| Err::<(), _>(format!("fail {n}")))
            .unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last, "fail 4");
        assert!(err.to_string().contains("4 attempt(s)"));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        let err = RetryPolicy::new(0, Duration::ZERO)
            .run(|_| {
                calls += 1;
                Err::<(), _>(())
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn delay_only_between_attempts() {
        let start = Instant::now();
        let _ = RetryPolicy::new(3, Duration::from_millis(20)).run(|_| Err::<(), _>(()));
        let elapsed = start.elapsed();
        // Two pauses, not three.
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(60) + Duration::from_millis(200));
    }
}
