//! Process management syscalls.

use log::trace;

use crate::config::{Fid, Pid, Task, NOPROC};
use crate::fs::procinfo::open_info;
use crate::sync::kernel_lock;
use crate::task::{
    current_process, exec_process, exit_current, wait_for_any_child, wait_for_specific_child,
};

/// Create a new process running `call` with a copy of `args`.
///
/// The child inherits the caller's open files. Returns the new pid, or
/// `NOPROC` when the process table is exhausted. With `call == None` the
/// process gets no thread at all; only the boot path uses that form.
pub fn sys_exec(call: Option<Task>, args: &[u8]) -> Pid {
    let _kernel = kernel_lock();
    trace!("kernel: sys_exec");
    exec_process(call, args)
}

/// Terminate the calling process with status `exitval`. Does not return.
pub fn sys_exit(exitval: i32) -> ! {
    let kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_exit({})",
        current_process().getpid(),
        exitval
    );
    exit_current(kernel, exitval)
}

/// Reap a child: a specific one, or with `cpid == NOPROC` whichever exits
/// first. Blocks until there is something to reap; `NOPROC` if there is no
/// such child.
pub fn sys_waitchild(cpid: Pid, status: Option<&mut i32>) -> Pid {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_waitchild [{}]",
        current_process().getpid(),
        cpid
    );
    if cpid != NOPROC {
        wait_for_specific_child(&mut kernel, cpid, status)
    } else {
        wait_for_any_child(&mut kernel, status)
    }
}

pub fn sys_getpid() -> Pid {
    current_process().getpid()
}

pub fn sys_getppid() -> Pid {
    let _kernel = kernel_lock();
    let parent = current_process().inner_exclusive_access().parent.clone();
    parent
        .and_then(|weak| weak.upgrade())
        .map_or(NOPROC, |parent| parent.getpid())
}

/// Open a procinfo stream over the process table.
pub fn sys_openinfo() -> Fid {
    let _kernel = kernel_lock();
    trace!("kernel:pid[{}] sys_openinfo", current_process().getpid());
    open_info()
}
