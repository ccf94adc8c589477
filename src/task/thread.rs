//! Kernel-scheduled threads within a process.
//!
//! Each thread is described by a `ThreadControlBlock` (PTCB) linked into its
//! process. Joiners reference-count the PTCB; it is reclaimed by the last
//! joiner, or together with the process. The exit of the last thread of a
//! process performs the whole process teardown.

use std::cell::RefMut;
use std::sync::{Arc, Weak};

use log::trace;

use crate::config::{Task, Tid, NOTHREAD};
use crate::sync::{Condvar, KernelGuard, UPSafeCell};

use super::id::tid_alloc;
use super::process::{get_pcb, ProcState, ProcessControlBlock};
use super::processor::{current_process, current_task, exit_kernel_thread, spawn_kernel_thread};

/// Thread control block (the per-process PTCB).
pub struct ThreadControlBlock {
    pub tid: Tid,
    /// main threads leave through the full process-exit path
    pub is_main: bool,
    pub process: Weak<ProcessControlBlock>,
    /// signalled when the thread exits or is detached
    pub exit_cv: Condvar,
    inner: UPSafeCell<ThreadInner>,
}

pub struct ThreadInner {
    pub task: Task,
    /// thread-owned copy of the argument bytes
    pub args: Vec<u8>,
    pub exited: bool,
    pub detached: bool,
    pub exitval: i32,
    /// number of joiners currently referencing this PTCB
    pub refcount: usize,
}

impl ThreadControlBlock {
    pub fn new(
        process: &Arc<ProcessControlBlock>,
        task: Task,
        args: Vec<u8>,
        is_main: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            tid: tid_alloc(),
            is_main,
            process: Arc::downgrade(process),
            exit_cv: Condvar::new(),
            inner: unsafe {
                UPSafeCell::new(ThreadInner {
                    task,
                    args,
                    exited: false,
                    detached: false,
                    exitval: 0,
                    refcount: 0,
                })
            },
        })
    }

    pub fn inner_exclusive_access(&self) -> RefMut<'_, ThreadInner> {
        self.inner.exclusive_access()
    }
}

/// A tid is valid iff it resolves in the calling process thread list.
fn find_thread(
    process: &Arc<ProcessControlBlock>,
    tid: Tid,
) -> Option<Arc<ThreadControlBlock>> {
    process
        .inner_exclusive_access()
        .threads
        .iter()
        .find(|t| t.tid == tid)
        .cloned()
}

/// Create a new thread in the current process, running `task` with a copy
/// of `args`. Returns the new tid, or `NOTHREAD` when no task is given.
pub fn create_thread(task: Option<Task>, args: &[u8]) -> Tid {
    let task = match task {
        Some(task) => task,
        None => return NOTHREAD,
    };
    let process = current_process();
    let tcb = ThreadControlBlock::new(&process, task, args.to_vec(), false);
    {
        let mut inner = process.inner_exclusive_access();
        inner.threads.push(Arc::clone(&tcb));
        inner.thread_count += 1;
    }
    spawn_kernel_thread(Arc::clone(&tcb));
    tcb.tid
}

/// Wait for a sibling thread to exit and collect its exit value.
///
/// Fails with −1 when the tid does not resolve in this process, names the
/// caller itself, or the target is (or becomes) detached. The last joiner
/// unlinks the PTCB from the process.
pub fn thread_join(kernel: &mut KernelGuard, tid: Tid, exitval: Option<&mut i32>) -> isize {
    let process = current_process();
    let target = match find_thread(&process, tid) {
        Some(target) => target,
        None => return -1,
    };
    if tid == current_task().unwrap().tid {
        return -1;
    }
    if target.inner_exclusive_access().detached {
        return -1;
    }

    target.inner_exclusive_access().refcount += 1;
    loop {
        let target_inner = target.inner_exclusive_access();
        if target_inner.exited || target_inner.detached {
            break;
        }
        drop(target_inner);
        target.exit_cv.wait(kernel);
    }

    let mut target_inner = target.inner_exclusive_access();
    target_inner.refcount -= 1;
    if target_inner.detached {
        // the exit value of a detached thread is discarded
        return -1;
    }
    if let Some(exitval) = exitval {
        *exitval = target_inner.exitval;
    }
    let last_reference = target_inner.refcount == 0;
    drop(target_inner);
    if last_reference {
        process
            .inner_exclusive_access()
            .threads
            .retain(|t| !Arc::ptr_eq(t, &target));
    }
    0
}

/// Detach a thread: discard its exit value and fail all joins against it.
pub fn thread_detach(tid: Tid) -> isize {
    if tid == NOTHREAD {
        return -1;
    }
    let process = current_process();
    let target = match find_thread(&process, tid) {
        Some(target) => target,
        None => return -1,
    };
    if target.inner_exclusive_access().exited {
        return -1;
    }
    target.inner_exclusive_access().detached = true;
    // joiners wake up, observe the detach and fail
    target.exit_cv.broadcast();
    0
}

/// Terminate the calling thread; if it was the last one of its process,
/// take the whole process down. Does not return.
pub fn thread_exit_current(kernel: KernelGuard, exitval: i32) -> ! {
    let tcb = current_task().unwrap();
    let process = tcb.process.upgrade().unwrap();
    trace!(
        "kernel:pid[{}] tid[{}] thread exit({})",
        process.getpid(),
        tcb.tid,
        exitval
    );
    {
        let mut inner = tcb.inner_exclusive_access();
        inner.exited = true;
        inner.exitval = exitval;
    }
    tcb.exit_cv.broadcast();
    let remaining = {
        let mut inner = process.inner_exclusive_access();
        inner.thread_count -= 1;
        inner.thread_count
    };
    if remaining == 0 {
        process_teardown(&process);
    }
    drop(kernel);
    // bye-bye cruel world
    exit_kernel_thread()
}

/// Last-thread teardown: hand every child to init, become a zombie on the
/// parent's exited list, and release files and argument storage.
///
/// The parent's `child_exit` is broadcast only after this process is linked
/// into the exited list; both happen inside one kernel-lock critical
/// section, so a reaper can never observe the link without the state.
fn process_teardown(process: &Arc<ProcessControlBlock>) {
    let pid = process.getpid();
    if pid != 1 {
        let initpcb = get_pcb(1).unwrap();

        // Reparent children (alive and zombie alike) to the initial task.
        let (children, exited_children) = {
            let mut inner = process.inner_exclusive_access();
            (
                std::mem::take(&mut inner.children),
                std::mem::take(&mut inner.exited_children),
            )
        };
        if !children.is_empty() {
            let had_exited = !exited_children.is_empty();
            let mut init_inner = initpcb.inner_exclusive_access();
            for child in children {
                child.inner_exclusive_access().parent = Some(Arc::downgrade(&initpcb));
                init_inner.children.push(child);
            }
            init_inner.exited_children.extend(exited_children);
            drop(init_inner);
            if had_exited {
                initpcb.child_exit.broadcast();
            }
        }

        // hand myself to my parent as a zombie
        let parent = {
            let inner = process.inner_exclusive_access();
            inner.parent.as_ref().unwrap().upgrade().unwrap()
        };
        parent
            .inner_exclusive_access()
            .exited_children
            .push_back(Arc::clone(process));
        parent.child_exit.broadcast();
    }

    let mut inner = process.inner_exclusive_access();
    // release the argument storage
    inner.args = Vec::new();
    // clean up the FIDT
    for slot in inner.fid_table.iter_mut() {
        if let Some(fcb) = slot.take() {
            fcb.decref();
        }
    }
    // disconnect the threads; the PTCBs die with their last Arc
    inner.main_thread = None;
    inner.threads.clear();
    // now, mark the process as exited
    inner.pstate = ProcState::Zombie;
}
