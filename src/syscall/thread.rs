//! Thread management syscalls.

use log::trace;

use crate::config::{Task, Tid};
use crate::sync::kernel_lock;
use crate::task::{
    create_thread, current_process, current_task, thread_detach, thread_exit_current, thread_join,
};

/// Create a new thread in the current process.
///
/// The thread runs `task` with a kernel-owned copy of `args`; its return
/// value becomes the thread exit value. `NOTHREAD` when no task is given.
pub fn sys_create_thread(task: Option<Task>, args: &[u8]) -> Tid {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_create_thread",
        current_process().getpid()
    );
    create_thread(task, args)
}

/// The tid of the calling thread.
pub fn sys_thread_self() -> Tid {
    current_task().unwrap().tid
}

/// Wait for a sibling thread to exit; 0 on success with its exit value in
/// `exitval`, −1 for unknown/self/detached targets.
pub fn sys_thread_join(tid: Tid, exitval: Option<&mut i32>) -> isize {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] tid[{}] sys_thread_join [{}]",
        current_process().getpid(),
        sys_thread_self(),
        tid
    );
    thread_join(&mut kernel, tid, exitval)
}

/// Detach a thread: its exit value is discarded and joins against it fail.
pub fn sys_thread_detach(tid: Tid) -> isize {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] tid[{}] sys_thread_detach [{}]",
        current_process().getpid(),
        sys_thread_self(),
        tid
    );
    thread_detach(tid)
}

/// Terminate the calling thread. Does not return.
pub fn sys_thread_exit(exitval: i32) -> ! {
    let kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] tid[{}] sys_thread_exit({})",
        current_process().getpid(),
        sys_thread_self(),
        exitval
    );
    thread_exit_current(kernel, exitval)
}
