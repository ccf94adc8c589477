//! Condition variables paired with the global kernel lock.

use std::time::Instant;

use super::KernelGuard;

/// Condition variable structure.
///
/// All waiters sleep under the global kernel lock; `wait` releases it
/// atomically and reacquires it before returning. Wakeups follow Mesa
/// semantics: a woken thread must re-check its predicate, because any number
/// of other threads may have run between the signal and the reacquisition.
pub struct Condvar {
    cvar: parking_lot::Condvar,
}

impl Condvar {
    /// Create a new condition variable.
    pub fn new() -> Self {
        Self {
            cvar: parking_lot::Condvar::new(),
        }
    }

    /// Block the current thread until signalled.
    pub fn wait(&self, kernel: &mut KernelGuard) {
        self.cvar.wait(kernel.inner());
    }

    /// Block until signalled or until `deadline` passes.
    ///
    /// Returns `true` if the wait ended because the deadline passed.
    pub fn timed_wait(&self, kernel: &mut KernelGuard, deadline: Instant) -> bool {
        self.cvar.wait_until(kernel.inner(), deadline).timed_out()
    }

    /// Wake one waiting thread.
    pub fn signal(&self) {
        self.cvar.notify_one();
    }

    /// Wake every waiting thread.
    pub fn broadcast(&self) {
        self.cvar.notify_all();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
