//! Socket syscalls.

use log::trace;

use crate::config::{Fid, Port, MAX_PORT, NOFILE};
use crate::net::{accept, connect, listen, shutdown, socket_new, ShutdownMode};
use crate::sync::kernel_lock;
use crate::task::current_process;

/// Return a new socket, bound to `port` unless `port` is `NOPORT`.
pub fn sys_socket(port: Port) -> Fid {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_socket port[{}]",
        current_process().getpid(),
        port
    );
    if port < 0 || port > MAX_PORT {
        return NOFILE;
    }
    socket_new(port)
}

/// Make `sock` the listener of its port. −1 unless the socket is unbound,
/// carries a legal port, and the port is free.
pub fn sys_listen(sock: Fid) -> isize {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_listen fid[{}]",
        current_process().getpid(),
        sock
    );
    listen(sock)
}

/// Block until a connection request arrives on the listener `lsock`, then
/// return the fid of the new server-side socket.
pub fn sys_accept(lsock: Fid) -> Fid {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_accept fid[{}]",
        current_process().getpid(),
        lsock
    );
    accept(&mut kernel, lsock)
}

/// Connect `sock` to the listener on `port`, waiting at most `timeout_ms`
/// milliseconds (negative means forever). 0 once connected, −1 otherwise.
pub fn sys_connect(sock: Fid, port: Port, timeout_ms: i64) -> isize {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_connect fid[{}] port[{}]",
        current_process().getpid(),
        sock,
        port
    );
    connect(&mut kernel, sock, port, timeout_ms)
}

/// Shut down one or both directions of a connected socket.
pub fn sys_shutdown(sock: Fid, how: ShutdownMode) -> isize {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_shutdown fid[{}] how[{:?}]",
        current_process().getpid(),
        sock,
        how
    );
    shutdown(sock, how)
}
