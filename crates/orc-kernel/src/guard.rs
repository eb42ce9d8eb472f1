//! [`SharedRecord`] – a record shared between execution contexts.
//!
//! Every piece of state that both the network context and the monitoring
//! context touch is wrapped in a `SharedRecord`.  Access is scoped: the
//! caller hands in a closure that receives `&mut T` while the lock is held,
//! and no reference survives the closure.  Acquisition is always bounded;
//! a caller that cannot get the lock in time receives
//! [`OrcError::LockTimeout`] and decides for itself whether to skip or retry.
//!
//! Records are never locked in a nested fashion.  Closures passed to
//! [`SharedRecord::with_lock`] must not touch another `SharedRecord`.

use std::time::Duration;

use orc_types::OrcError;
use parking_lot::Mutex;
use tracing::debug;

/// Bound applied by the convenience accessors.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

// ────────────────────────────────────────────────────────────────────────────
// SharedRecord
// ────────────────────────────────────────────────────────────────────────────

/// A named, lock-protected record with bounded-wait access.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use orc_kernel::guard::SharedRecord;
///
/// let counter = SharedRecord::new("counter", 0u32);
/// counter.with(|c| *c += 1).unwrap();
/// assert_eq!(counter.snapshot().unwrap(), 1);
///
/// let n = counter
///     .with_lock(Duration::from_millis(10), |c| *c * 10)
///     .unwrap();
/// assert_eq!(n, 10);
/// ```
pub struct SharedRecord<T> {
    name: &'static str,
    timeout: Duration,
    inner: Mutex<T>,
}

impl<T> SharedRecord<T> {
    /// Wrap `value` under `name` with the default 100 ms bound.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            timeout: DEFAULT_LOCK_TIMEOUT,
            inner: Mutex::new(value),
        }
    }

    /// Override the bound used by [`with`](Self::with),
    /// [`snapshot`](Self::snapshot) and [`replace`](Self::replace).
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `body` with exclusive access, waiting at most `timeout` for the
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] naming this record when the lock is
    /// not acquired in time; `body` is then not run.
    pub fn with_lock<R>(
        &self,
        timeout: Duration,
        body: impl FnOnce(&mut T) -> R,
    ) -> Result<R, OrcError> {
        match self.inner.try_lock_for(timeout) {
            Some(mut guard) => Ok(body(&mut guard)),
            None => {
                debug!(record = self.name, timeout_ms = timeout.as_millis() as u64, "lock timeout");
                Err(OrcError::LockTimeout {
                    record: self.name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// [`with_lock`](Self::with_lock) using the record's default bound.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn with<R>(&self, body: impl FnOnce(&mut T) -> R) -> Result<R, OrcError> {
        self.with_lock(self.timeout, body)
    }

    /// Swap in `value`, returning the previous contents.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention; the record is then
    /// unchanged.
    pub fn replace(&self, value: T) -> Result<T, OrcError> {
        self.with(|slot| std::mem::replace(slot, value))
    }
}

impl<T: Clone> SharedRecord<T> {
    /// A copy of the whole record, taken under the lock.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn snapshot(&self) -> Result<T, OrcError> {
        self.with(|value| value.clone())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
