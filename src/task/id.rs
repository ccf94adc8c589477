//! Pid and tid allocation.
//!
//! Pids are recycled through a free list, so the process table stays dense
//! at the low end and the idle/init pids come out first. Tids are handed out
//! monotonically and never reused within a boot: a stale tid can then never
//! alias a newer thread, it simply stops resolving.

use crate::config::{Tid, MAX_PROC};
use crate::sync::UPSafeCell;
use lazy_static::*;

pub struct RecycleAllocator {
    current: usize,
    recycled: Vec<usize>,
    capacity: usize,
}

impl RecycleAllocator {
    pub fn new(capacity: usize) -> Self {
        RecycleAllocator {
            current: 0,
            recycled: Vec::new(),
            capacity,
        }
    }
    pub fn alloc(&mut self) -> Option<usize> {
        if let Some(id) = self.recycled.pop() {
            Some(id)
        } else if self.current < self.capacity {
            self.current += 1;
            Some(self.current - 1)
        } else {
            None
        }
    }
    pub fn dealloc(&mut self, id: usize) {
        assert!(id < self.current);
        assert!(
            !self.recycled.iter().any(|i| *i == id),
            "id {} has been deallocated!",
            id
        );
        self.recycled.push(id);
    }
    pub fn reset(&mut self) {
        self.current = 0;
        self.recycled.clear();
    }
}

lazy_static! {
    static ref PID_ALLOCATOR: UPSafeCell<RecycleAllocator> =
        unsafe { UPSafeCell::new(RecycleAllocator::new(MAX_PROC)) };
    static ref TID_ALLOCATOR: UPSafeCell<Tid> = unsafe { UPSafeCell::new(1) };
}

/// Abstract structure of PID
pub struct PidHandle(pub usize);

impl Drop for PidHandle {
    fn drop(&mut self) {
        PID_ALLOCATOR.exclusive_access().dealloc(self.0);
    }
}

/// Allocate a new PID, or `None` when the process table is full.
pub fn pid_alloc() -> Option<PidHandle> {
    PID_ALLOCATOR.exclusive_access().alloc().map(PidHandle)
}

/// Allocate a fresh tid. `NOTHREAD` (0) is never produced.
pub fn tid_alloc() -> Tid {
    let mut next = TID_ALLOCATOR.exclusive_access();
    let tid = *next;
    *next += 1;
    tid
}

/// Forget every id of the previous boot. All `PidHandle`s must have been
/// dropped first.
pub fn reset_allocators() {
    PID_ALLOCATOR.exclusive_access().reset();
    *TID_ALLOCATOR.exclusive_access() = 1;
}

#[cfg(test)]
mod tests {
    use super::RecycleAllocator;

    #[test]
    fn recycle_allocator_is_lifo_and_bounded() {
        let mut alloc = RecycleAllocator::new(3);
        assert_eq!(alloc.alloc(), Some(0));
        assert_eq!(alloc.alloc(), Some(1));
        assert_eq!(alloc.alloc(), Some(2));
        assert_eq!(alloc.alloc(), None);
        alloc.dealloc(1);
        alloc.dealloc(2);
        // most recently freed comes back first
        assert_eq!(alloc.alloc(), Some(2));
        assert_eq!(alloc.alloc(), Some(1));
        assert_eq!(alloc.alloc(), None);
    }

    #[test]
    #[should_panic]
    fn double_dealloc_is_rejected() {
        let mut alloc = RecycleAllocator::new(2);
        let id = alloc.alloc().unwrap();
        alloc.dealloc(id);
        alloc.dealloc(id);
    }
}
