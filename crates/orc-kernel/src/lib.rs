//! `orc-kernel` – Synchronization & Resilience Primitives
//!
//! The small set of primitives every cross-context interaction in the
//! controller is built from.  Nothing here knows about clocks or networks.
//!
//! # Modules
//!
//! - [`guard`] – [`SharedRecord`][guard::SharedRecord]: a named record with
//!   scoped, bounded-wait access.  Lock contention surfaces as
//!   [`OrcError::LockTimeout`][orc_types::OrcError::LockTimeout] rather than
//!   an indefinite block.
//! - [`retry`] – [`RetryPolicy`][retry::RetryPolicy]: run an operation a
//!   fixed number of times with a pause in between, returning
//!   [`RetryExhausted`][retry::RetryExhausted] with the last error.
//! - [`barrier`] – [`StartupBarrier`][barrier::StartupBarrier]: a one-shot
//!   two-party rendezvous so neither context starts its main loop before
//!   the other has finished setup.

pub mod barrier;
pub mod guard;
pub mod retry;

pub use barrier::{SetupHandle, StartupBarrier};
pub use guard::{DEFAULT_LOCK_TIMEOUT, SharedRecord};
pub use retry::{RetryExhausted, RetryPolicy};
