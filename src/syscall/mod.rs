//! The system-call surface: thin validators in front of the kernel
//! subsystems. Every call acquires the global kernel lock exactly once and
//! returns an explicit integer status; there are no exceptions.

mod fs;
mod net;
mod process;
mod thread;

pub use fs::{sys_close, sys_dup2, sys_pipe, sys_read, sys_write};
pub use net::{sys_accept, sys_connect, sys_listen, sys_shutdown, sys_socket};
pub use process::{sys_exec, sys_exit, sys_getpid, sys_getppid, sys_openinfo, sys_waitchild};
pub use thread::{
    sys_create_thread, sys_thread_detach, sys_thread_exit, sys_thread_join, sys_thread_self,
};
