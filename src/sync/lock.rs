//! The global kernel lock.
//!
//! A single mutex serialises every kernel state transition. A system call
//! acquires it once on entry; blocking operations hand the guard to a
//! [`Condvar`](super::Condvar), which releases the lock atomically while the
//! caller sleeps and reacquires it before the caller observes any state.

use lazy_static::*;
use parking_lot::{Mutex, MutexGuard};

lazy_static! {
    static ref KERNEL_LOCK: Mutex<()> = Mutex::new(());
}

/// Proof that the calling thread holds the global kernel lock.
///
/// Dropping the guard releases the lock. Functions that may block take
/// `&mut KernelGuard` so they can sleep on a condition variable.
pub struct KernelGuard {
    guard: MutexGuard<'static, ()>,
}

impl KernelGuard {
    pub(crate) fn inner(&mut self) -> &mut MutexGuard<'static, ()> {
        &mut self.guard
    }
}

/// Acquire the global kernel lock, blocking until it is free.
pub fn kernel_lock() -> KernelGuard {
    KernelGuard {
        guard: KERNEL_LOCK.lock(),
    }
}
