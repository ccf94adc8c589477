//! Interior mutability for kernel objects protected by the global kernel lock.

use core::cell::{RefCell, RefMut};

/// Wrap a static data structure inside it so that we are able to access it
/// without any `unsafe`.
///
/// In the original single-core kernel this cell was safe because kernel code
/// was never preempted. Here the same guarantee comes from the global kernel
/// lock: every kernel control path acquires it before touching any
/// `UPSafeCell`, so at most one thread is inside `exclusive_access` at a time.
pub struct UPSafeCell<T> {
    /// inner data
    inner: RefCell<T>,
}

unsafe impl<T> Sync for UPSafeCell<T> {}

impl<T> UPSafeCell<T> {
    /// User is responsible to guarantee that inner struct is only used
    /// while holding the kernel lock.
    pub unsafe fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }
    /// Panic if the data has been borrowed.
    pub fn exclusive_access(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }
}
