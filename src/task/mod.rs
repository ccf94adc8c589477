//! Task management: processes, their threads, and the identifiers of both.
//!
//! A process is a `ProcessControlBlock` slot in the global process table; a
//! thread is a `ThreadControlBlock` owned by its process and mapped onto a
//! host thread. Everything here is manipulated under the global kernel lock.

mod id;
mod process;
mod processor;
mod thread;

pub use id::{pid_alloc, tid_alloc, PidHandle, RecycleAllocator};
pub use process::{
    exec_process, exit_current, get_pcb, initialize_processes, shutdown_tables,
    wait_for_any_child, wait_for_specific_child, PcbInner, ProcState, ProcessControlBlock,
    PROC_TABLE,
};
pub use processor::{
    current_process, current_task, exit_kernel_thread, install_panic_hook, spawn_kernel_thread,
    take_join_handle,
};
pub use thread::{
    create_thread, thread_detach, thread_exit_current, thread_join, ThreadControlBlock,
    ThreadInner,
};
