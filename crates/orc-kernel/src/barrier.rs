//! [`StartupBarrier`] – both execution contexts finish their one-time setup
//! before either proceeds.
//!
//! [`StartupBarrier::pair`] hands out one [`SetupHandle`] per context.  Each
//! context runs its setup and then calls [`SetupHandle::complete_and_wait`],
//! which blocks on a condition variable until the other side has completed
//! too.  A context whose setup fails simply drops its handle; the peer is
//! woken and receives [`OrcError::FatalInitFailure`] instead of waiting
//! forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orc_types::OrcError;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Pending,
    Complete,
    Abandoned,
}

struct Shared {
    sides: Mutex<[Side; 2]>,
    changed: Condvar,
}

/// Factory for a one-shot, two-party startup rendezvous.
pub struct StartupBarrier;

impl StartupBarrier {
    /// Create the two handles.  `first` and `second` name the contexts in
    /// logs and errors.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use std::time::Duration;
    /// use orc_kernel::barrier::StartupBarrier;
    ///
    /// let (net, mon) = StartupBarrier::pair("network", "monitoring");
    /// let t = thread::spawn(move || mon.complete_and_wait(Duration::from_secs(1)));
    /// net.complete_and_wait(Duration::from_secs(1)).unwrap();
    /// t.join().unwrap().unwrap();
    /// ```
    pub fn pair(first: &'static str, second: &'static str) -> (SetupHandle, SetupHandle) {
        let shared = Arc::new(Shared {
            sides: Mutex::new([Side::Pending; 2]),
            changed: Condvar::new(),
        });
        (
            SetupHandle {
                shared: Arc::clone(&shared),
                index: 0,
                name: first,
                peer: second,
                finished: false,
            },
            SetupHandle {
                shared,
                index: 1,
                name: second,
                peer: first,
                finished: false,
            },
        )
    }
}

/// One context's side of a [`StartupBarrier`].
///
/// Dropping a handle without calling
/// [`complete_and_wait`](SetupHandle::complete_and_wait) marks that side as
/// failed.
pub struct SetupHandle {
    shared: Arc<Shared>,
    index: usize,
    name: &'static str,
    peer: &'static str,
    finished: bool,
}

impl SetupHandle {
    /// Mark this side complete and block until the peer completes.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::FatalInitFailure`] when the peer abandoned its
    /// setup or did not complete within `timeout`.
    pub fn complete_and_wait(mut self, timeout: Duration) -> Result<(), OrcError> {
        self.finished = true;
        let deadline = Instant::now() + timeout;
        let peer_index = 1 - self.index;

        let mut sides = self.shared.sides.lock();
        sides[self.index] = Side::Complete;
        self.shared.changed.notify_all();
        debug!(context = self.name, "setup complete, waiting for {}", self.peer);

        loop {
            match sides[peer_index] {
                Side::Complete => return Ok(()),
                Side::Abandoned => {
                    error!(context = self.name, peer = self.peer, "peer setup failed");
                    return Err(OrcError::FatalInitFailure(format!(
                        "{} context failed during setup",
                        self.peer
                    )));
                }
                Side::Pending => {
                    if self
                        .shared
                        .changed
                        .wait_until(&mut sides, deadline)
                        .timed_out()
                        && sides[peer_index] == Side::Pending
                    {
                        error!(
                            context = self.name,
                            peer = self.peer,
                            timeout_ms = timeout.as_millis() as u64,
                            "peer setup timed out"
                        );
                        return Err(OrcError::FatalInitFailure(format!(
                            "{} context did not finish setup within {} ms",
                            self.peer,
                            timeout.as_millis()
                        )));
                    }
                }
            }
        }
    }
}

impl Drop for SetupHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut sides = self.shared.sides.lock();
        if sides[self.index] == Side::Pending {
            sides[self.index] = Side::Abandoned;
            self.shared.changed.notify_all();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
