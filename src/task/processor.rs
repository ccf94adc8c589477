//! Kernel-thread plumbing: tracking the thread control block of the calling
//! thread, spawning new kernel threads, and the bootstrap every thread runs.
//!
//! Scheduling proper (ready queues, context switches, preemption) is the
//! host's business; the kernel only decides who blocks and who wakes.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread::JoinHandle;

use lazy_static::*;
use log::error;

use crate::sync::{kernel_lock, UPSafeCell};

use super::process::ProcessControlBlock;
use super::thread::ThreadControlBlock;

thread_local! {
    /// The control block of the thread running on this host thread.
    static CURRENT: RefCell<Option<Arc<ThreadControlBlock>>> = RefCell::new(None);
}

lazy_static! {
    /// Handles of every kernel thread of the running boot; `boot` joins
    /// them all before tearing the tables down.
    static ref JOIN_HANDLES: UPSafeCell<Vec<JoinHandle<()>>> =
        unsafe { UPSafeCell::new(Vec::new()) };
}

/// Get a copy of the current thread control block.
///
/// `None` outside task context (i.e. on the booting thread).
pub fn current_task() -> Option<Arc<ThreadControlBlock>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// The process the calling thread belongs to.
pub fn current_process() -> Arc<ProcessControlBlock> {
    current_task().unwrap().process.upgrade().unwrap()
}

/// Private unwind payload of the thread-exit path.
struct ExitToken;

/// Leave the calling kernel thread for good. The kernel lock must already
/// be released. Unwinds into `thread_bootstrap`, which absorbs the token.
pub fn exit_kernel_thread() -> ! {
    panic::panic_any(ExitToken)
}

static HOOK: Once = Once::new();

/// Keep the default panic hook quiet about the controlled unwind of the
/// thread-exit path; every other panic still reports normally.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ExitToken>().is_none() {
                default_hook(info);
            }
        }));
    });
}

/// Start a kernel thread for `tcb`.
///
/// Must be called with the kernel lock held and the control block fully
/// linked into its process; the new thread may run immediately.
pub fn spawn_kernel_thread(tcb: Arc<ThreadControlBlock>) {
    let pid = tcb.process.upgrade().unwrap().getpid();
    let name = format!("pid[{}] tid[{}]", pid, tcb.tid);
    let handle = std::thread::Builder::new()
        .name(name)
        .spawn(move || thread_bootstrap(tcb))
        .expect("kernel: unable to spawn a kernel thread");
    JOIN_HANDLES.exclusive_access().push(handle);
}

/// Pop one tracked kernel-thread handle, if any remain.
pub fn take_join_handle() -> Option<JoinHandle<()>> {
    JOIN_HANDLES.exclusive_access().pop()
}

/// The entry of every kernel thread.
///
/// Runs the task and funnels its return value into the appropriate exit
/// path. Exit never returns normally: it unwinds back here with `ExitToken`
/// after the bookkeeping is done. A task that panics on its own is folded
/// into an ordinary exit with status −1.
fn thread_bootstrap(tcb: Arc<ThreadControlBlock>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(Arc::clone(&tcb)));
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let (task, args) = {
            let _kernel = kernel_lock();
            let inner = tcb.inner_exclusive_access();
            (inner.task, inner.args.clone())
        };
        let exitval = task(&args);
        if tcb.is_main {
            crate::syscall::sys_exit(exitval)
        } else {
            crate::syscall::sys_thread_exit(exitval)
        }
    }));
    if let Err(payload) = result {
        if payload.downcast_ref::<ExitToken>().is_none() {
            error!(
                "kernel: tid[{}] panicked, treating as exit with status -1",
                tcb.tid
            );
            let already_exited = {
                let _kernel = kernel_lock();
                tcb.inner_exclusive_access().exited
            };
            if !already_exited {
                let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                    if tcb.is_main {
                        crate::syscall::sys_exit(-1)
                    } else {
                        crate::syscall::sys_thread_exit(-1)
                    }
                }));
            }
        }
    }
}
