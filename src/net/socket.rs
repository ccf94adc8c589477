//! Stream-oriented local sockets.
//!
//! A socket starts UNBOUND; bound to a port it may become the port's unique
//! LISTENER; a successful rendezvous turns an unbound socket and a fresh
//! server-side socket into a PEER pair wired together by two pipes of
//! opposite directions. Connection requests queue at the listener FIFO and
//! carry their own condition variable; `accept` admits the head of the
//! queue and wakes its owner.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use lazy_static::*;
use log::trace;

use crate::config::{Fid, Port, MAX_PORT, NOFILE, NOPORT};
use crate::fs::pipe::PipeCb;
use crate::fs::{fcb_reserve, get_socket, File};
use crate::sync::{Condvar, KernelGuard, UPSafeCell};

bitflags! {
    /// Which direction(s) of a connection to shut down.
    pub struct ShutdownMode: u32 {
        const READ = 1;
        const WRITE = 2;
        const BOTH = Self::READ.bits | Self::WRITE.bits;
    }
}

/// Socket control block.
pub struct Scb {
    inner: UPSafeCell<ScbInner>,
}

pub struct ScbInner {
    /// bound port, or `NOPORT`; a closed listener reverts to `NOPORT`
    pub port: Port,
    pub kind: SocketKind,
}

/// The three lives of a socket.
pub enum SocketKind {
    /// freshly created; may listen (if bound) or connect
    Unbound,
    /// registered in the port map, collecting connection requests
    Listener {
        queue: VecDeque<Arc<ConnectionRequest>>,
        req_available: Arc<Condvar>,
    },
    /// one half of an established connection
    Peer {
        peer: Weak<Scb>,
        /// `None` once the direction has been shut down
        read_pipe: Option<Arc<PipeCb>>,
        write_pipe: Option<Arc<PipeCb>>,
    },
}

/// A pending connection, owned by the requester and queued at the listener.
pub struct ConnectionRequest {
    pub peer: Arc<Scb>,
    /// signalled by `accept` once the request is admitted
    pub connected_cv: Condvar,
    admitted: UPSafeCell<bool>,
}

impl Scb {
    pub fn new(port: Port) -> Arc<Self> {
        Arc::new(Self {
            inner: unsafe {
                UPSafeCell::new(ScbInner {
                    port,
                    kind: SocketKind::Unbound,
                })
            },
        })
    }

    pub fn inner_exclusive_access(&self) -> std::cell::RefMut<'_, ScbInner> {
        self.inner.exclusive_access()
    }
}

lazy_static! {
    /// At most one listener per port.
    static ref PORT_MAP: UPSafeCell<Vec<Option<Arc<Scb>>>> =
        unsafe { UPSafeCell::new(Vec::new()) };
}

/// Build the (empty) port map. Called once per boot.
pub fn initialize_port_map() {
    *PORT_MAP.exclusive_access() = (0..=MAX_PORT as usize).map(|_| None).collect();
}

/// Drop whatever the previous boot left in the port map.
pub fn clear_port_map() {
    PORT_MAP.exclusive_access().clear();
}

/// The stream object in front of an SCB.
pub struct SocketFile(pub Arc<Scb>);

impl File for SocketFile {
    fn read(&self, kernel: &mut KernelGuard, buf: &mut [u8]) -> isize {
        let pipe = {
            let inner = self.0.inner_exclusive_access();
            match &inner.kind {
                SocketKind::Peer {
                    read_pipe: Some(pipe),
                    ..
                } => Arc::clone(pipe),
                _ => return -1,
            }
        };
        pipe.read(kernel, buf)
    }

    fn write(&self, kernel: &mut KernelGuard, buf: &[u8]) -> isize {
        let pipe = {
            let inner = self.0.inner_exclusive_access();
            match &inner.kind {
                SocketKind::Peer {
                    write_pipe: Some(pipe),
                    ..
                } => Arc::clone(pipe),
                _ => return -1,
            }
        };
        pipe.write(kernel, buf)
    }

    fn close(&self) -> isize {
        socket_close(&self.0)
    }

    fn as_socket(&self) -> Option<Arc<Scb>> {
        Some(Arc::clone(&self.0))
    }
}

/// Create an unbound socket on `port` and hand out a fid for it.
pub fn socket_new(port: Port) -> Fid {
    let scb = Scb::new(port);
    let file: Arc<dyn File> = Arc::new(SocketFile(scb));
    match fcb_reserve(vec![file]) {
        Some(fids) => fids[0],
        None => NOFILE,
    }
}

/// Turn an unbound, bound-to-a-port socket into its port's listener.
pub fn listen(sock: Fid) -> isize {
    let scb = match get_socket(sock) {
        Some(scb) => scb,
        None => return -1,
    };
    let mut inner_guard = scb.inner_exclusive_access();
    let inner = &mut *inner_guard;
    if !matches!(inner.kind, SocketKind::Unbound) {
        return -1;
    }
    if inner.port < 1 || inner.port > MAX_PORT {
        return -1;
    }
    let port_slot = inner.port as usize;
    if PORT_MAP.exclusive_access()[port_slot].is_some() {
        // the port is occupied by another listener
        return -1;
    }
    trace!("kernel: listen on port {}", inner.port);
    inner.kind = SocketKind::Listener {
        queue: VecDeque::new(),
        req_available: Arc::new(Condvar::new()),
    };
    drop(inner_guard);
    PORT_MAP.exclusive_access()[port_slot] = Some(scb);
    0
}

/// Request a connection to the listener on `port` and wait to be admitted.
///
/// A negative timeout waits indefinitely. On timeout the request is pulled
/// back out of the listener queue and −1 is returned; the listener going
/// away while we wait fails the same way.
pub fn connect(kernel: &mut KernelGuard, sock: Fid, port: Port, timeout_ms: i64) -> isize {
    let scb = match get_socket(sock) {
        Some(scb) => scb,
        None => return -1,
    };
    if !matches!(scb.inner_exclusive_access().kind, SocketKind::Unbound) {
        return -1;
    }
    if port < 1 || port > MAX_PORT {
        return -1;
    }
    let listener = match PORT_MAP.exclusive_access()[port as usize].clone() {
        Some(listener) => listener,
        None => return -1,
    };
    trace!("kernel: connect to port {} (timeout {} ms)", port, timeout_ms);

    let request = Arc::new(ConnectionRequest {
        peer: Arc::clone(&scb),
        connected_cv: Condvar::new(),
        admitted: unsafe { UPSafeCell::new(false) },
    });
    {
        let mut listener_inner = listener.inner_exclusive_access();
        match &mut listener_inner.kind {
            SocketKind::Listener {
                queue,
                req_available,
            } => {
                queue.push_back(Arc::clone(&request));
                req_available.signal();
            }
            _ => return -1,
        }
    }

    let deadline = if timeout_ms < 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    };
    loop {
        if *request.admitted.exclusive_access() {
            return 0;
        }
        if listener.inner_exclusive_access().port == NOPORT {
            // the listener was closed beneath us; its close already drained
            // the queue, nothing left to unlink
            return -1;
        }
        match deadline {
            None => request.connected_cv.wait(kernel),
            Some(deadline) => {
                if request.connected_cv.timed_wait(kernel, deadline) {
                    // timed out; the accept may still have slipped in just
                    // before the deadline
                    if *request.admitted.exclusive_access() {
                        return 0;
                    }
                    let mut listener_inner = listener.inner_exclusive_access();
                    if let SocketKind::Listener { queue, .. } = &mut listener_inner.kind {
                        queue.retain(|r| !Arc::ptr_eq(r, &request));
                    }
                    return -1;
                }
            }
        }
    }
}

/// Wait for a connection request on a listening socket and establish the
/// connection. Returns the fid of the new server-side peer socket.
pub fn accept(kernel: &mut KernelGuard, lsock: Fid) -> Fid {
    let listener = match get_socket(lsock) {
        Some(scb) => scb,
        None => return NOFILE,
    };
    let req_available = {
        let inner = listener.inner_exclusive_access();
        match &inner.kind {
            SocketKind::Listener { req_available, .. } => Arc::clone(req_available),
            _ => return NOFILE,
        }
    };

    loop {
        let inner = listener.inner_exclusive_access();
        if inner.port == NOPORT {
            // the listening socket was closed while we waited
            return NOFILE;
        }
        let queue_empty = match &inner.kind {
            SocketKind::Listener { queue, .. } => queue.is_empty(),
            _ => return NOFILE,
        };
        if !queue_empty {
            break;
        }
        drop(inner);
        req_available.wait(kernel);
    }

    // Reserve the server-side socket before consuming the request, so that
    // fid exhaustion leaves the request queued for a luckier accepter.
    let listener_port = listener.inner_exclusive_access().port;
    let server_fid = socket_new(listener_port);
    if server_fid == NOFILE {
        return NOFILE;
    }
    let server_scb = get_socket(server_fid).unwrap();
    let request = {
        let mut inner = listener.inner_exclusive_access();
        match &mut inner.kind {
            SocketKind::Listener { queue, .. } => queue.pop_front().unwrap(),
            _ => unreachable!("listener changed kind while bound"),
        }
    };
    let client_scb = Arc::clone(&request.peer);
    trace!("kernel: accept on port {}", listener_port);

    // Two pipes of opposite directions, one fid serving both at each end.
    let server_to_client = PipeCb::new();
    let client_to_server = PipeCb::new();
    server_scb.inner_exclusive_access().kind = SocketKind::Peer {
        peer: Arc::downgrade(&client_scb),
        read_pipe: Some(Arc::clone(&client_to_server)),
        write_pipe: Some(Arc::clone(&server_to_client)),
    };
    client_scb.inner_exclusive_access().kind = SocketKind::Peer {
        peer: Arc::downgrade(&server_scb),
        read_pipe: Some(server_to_client),
        write_pipe: Some(client_to_server),
    };

    *request.admitted.exclusive_access() = true;
    request.connected_cv.signal();
    server_fid
}

/// Shut down one or both directions of a connected socket.
pub fn shutdown(sock: Fid, how: ShutdownMode) -> isize {
    if how.is_empty() {
        return -1;
    }
    let scb = match get_socket(sock) {
        Some(scb) => scb,
        None => return -1,
    };
    let mut inner_guard = scb.inner_exclusive_access();
    let inner = &mut *inner_guard;
    let (read_pipe, write_pipe) = match &mut inner.kind {
        SocketKind::Peer {
            read_pipe,
            write_pipe,
            ..
        } => (read_pipe, write_pipe),
        _ => return -1,
    };
    let mut status = 0;
    if how.contains(ShutdownMode::READ) {
        match read_pipe.take() {
            Some(pipe) => {
                pipe.close_reader();
            }
            // that direction is already gone
            None => status = -1,
        }
    }
    if how.contains(ShutdownMode::WRITE) {
        match write_pipe.take() {
            Some(pipe) => {
                pipe.close_writer();
            }
            None => status = -1,
        }
    }
    status
}

/// Stream close of a socket fid.
///
/// Listeners release their port and wake every blocked party: queued
/// requesters observe the dead port and fail their connect, accepters
/// observe it and fail with `NOFILE`. Peers close both pipe halves they
/// own. The SCB itself dies with its last reference.
fn socket_close(scb: &Arc<Scb>) -> isize {
    enum Cleanup {
        Plain,
        Listener {
            drained: Vec<Arc<ConnectionRequest>>,
            req_available: Arc<Condvar>,
            port_slot: usize,
        },
        Peer {
            read_pipe: Option<Arc<PipeCb>>,
            write_pipe: Option<Arc<PipeCb>>,
        },
    }

    let cleanup = {
        let mut inner_guard = scb.inner_exclusive_access();
        let inner = &mut *inner_guard;
        match &mut inner.kind {
            SocketKind::Unbound => Cleanup::Plain,
            SocketKind::Listener {
                queue,
                req_available,
            } => {
                let cleanup = Cleanup::Listener {
                    drained: queue.drain(..).collect(),
                    req_available: Arc::clone(req_available),
                    port_slot: inner.port as usize,
                };
                inner.port = NOPORT;
                cleanup
            }
            SocketKind::Peer {
                read_pipe,
                write_pipe,
                ..
            } => Cleanup::Peer {
                read_pipe: read_pipe.take(),
                write_pipe: write_pipe.take(),
            },
        }
    };

    match cleanup {
        Cleanup::Plain => 0,
        Cleanup::Listener {
            drained,
            req_available,
            port_slot,
        } => {
            PORT_MAP.exclusive_access()[port_slot] = None;
            for request in drained {
                request.connected_cv.broadcast();
            }
            req_available.broadcast();
            0
        }
        Cleanup::Peer {
            read_pipe,
            write_pipe,
        } => {
            if let Some(pipe) = read_pipe {
                pipe.close_reader();
            }
            if let Some(pipe) = write_pipe {
                pipe.close_writer();
            }
            0
        }
    }
}
