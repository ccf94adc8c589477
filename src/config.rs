//! Kernel compile-time configuration and the types of the system-call surface.

/// Size of the process table; also the hard ceiling on live pids.
pub const MAX_PROC: usize = 65536;
/// Number of slots in each process file-id table (FIDT).
pub const MAX_FILEID: usize = 16;
/// Highest bindable socket port. Valid ports are `1..=MAX_PORT`.
pub const MAX_PORT: Port = 1023;
/// Capacity of a pipe ring buffer in bytes (a power of two).
pub const PIPE_BUFFER_SIZE: usize = 16384;
/// How many leading argument bytes a procinfo record carries.
pub const MAX_ARG_PAYLOAD: usize = 128;

/// Process identifier: the index of a PCB in the process table.
pub type Pid = usize;
/// Returned where no process can be: table exhaustion, no such child.
/// Pid 0 names the idle process, which is never a legal wait target,
/// so the value doubles as the sentinel.
pub const NOPROC: Pid = 0;

/// Thread identifier. Tids are assigned monotonically and never reused
/// within a boot; a tid is only valid inside its owning process.
pub type Tid = usize;
/// The invalid thread id.
pub const NOTHREAD: Tid = 0;

/// File identifier, an index into the calling process FIDT.
pub type Fid = isize;
/// The invalid file id.
pub const NOFILE: Fid = -1;

/// Socket port number.
pub type Port = i32;
/// "No port": a socket bound to NOPORT cannot listen.
pub const NOPORT: Port = 0;

/// A task entry point. The argument slice is the kernel-owned copy of the
/// bytes passed to `Exec` or `CreateThread`; the return value becomes the
/// exit status of the thread (and of the process, for main threads).
pub type Task = fn(args: &[u8]) -> i32;
