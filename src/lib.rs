//! MinOS: the user-visible kernel layer of a tiny teaching operating system.
//!
//! The kernel offers processes, kernel-scheduled threads within a process,
//! byte-stream pipes and stream-oriented local sockets, all reachable
//! through a uniform file-descriptor abstraction. It is hosted: kernel
//! threads are `std` threads, and a single global kernel lock serialises
//! every kernel state transition, with condition variables providing the
//! blocking points. CPU scheduling, memory management and device I/O stay
//! with the host.
//!
//! A kernel instance is entered through [`boot`], which starts an init task
//! as pid 1 and runs until every process has finished:
//!
//! ```
//! fn init(_args: &[u8]) -> i32 {
//!     let mut pipe = minos::PipeFids::default();
//!     assert_eq!(minos::sys_pipe(&mut pipe), 0);
//!     assert_eq!(minos::sys_write(pipe.write, b"hi"), 2);
//!     let mut buf = [0u8; 2];
//!     assert_eq!(minos::sys_read(pipe.read, &mut buf), 2);
//!     0
//! }
//! assert_eq!(minos::boot(init, &[]), 0);
//! ```

pub mod config;
pub mod fs;
pub mod net;
pub mod sync;
pub mod syscall;
pub mod task;

use lazy_static::*;
use log::debug;

pub use config::{
    Fid, Pid, Port, Task, Tid, MAX_ARG_PAYLOAD, MAX_FILEID, MAX_PORT, MAX_PROC, NOFILE, NOPORT,
    NOPROC, NOTHREAD, PIPE_BUFFER_SIZE,
};
pub use fs::pipe::PipeFids;
pub use fs::procinfo::{ProcInfo, PROCINFO_SIZE};
pub use net::ShutdownMode;
pub use syscall::*;

lazy_static! {
    /// Successive boots share the global tables; run them one at a time.
    static ref BOOT_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
}

/// Boot the kernel: initialise the tables, start the idle process (pid 0)
/// and the init task (pid 1), then run until every kernel thread has
/// terminated. Returns the exit status of the init process.
///
/// The init task is the root of the process tree. It adopts every orphan
/// and, on exit, drains all remaining children, so a finished boot leaves
/// no process behind.
pub fn boot(init: Task, args: &[u8]) -> i32 {
    let _boot = BOOT_LOCK.lock();
    task::install_panic_hook();
    {
        let _kernel = sync::kernel_lock();
        net::initialize_port_map();
        task::initialize_processes();
        let init_pid = task::exec_process(Some(init), args);
        assert_eq!(init_pid, 1, "the init process does not have pid==1");
    }

    // Run until the last kernel thread is gone. Threads spawned while we
    // join keep appearing on the list; a drained list means quiescence,
    // because only live threads spawn new ones.
    loop {
        let handle = {
            let _kernel = sync::kernel_lock();
            task::take_join_handle()
        };
        match handle {
            Some(handle) => {
                let _ = handle.join();
            }
            None => break,
        }
    }

    let _kernel = sync::kernel_lock();
    let status = task::shutdown_tables();
    debug!("kernel: boot finished, init exited with {}", status);
    status
}
