//! The stream layer: the `File` operation vtable, reference-counted file
//! control blocks, and the per-process file-id table (FIDT).

pub mod pipe;
pub mod procinfo;

use std::sync::Arc;

use crate::config::{Fid, MAX_FILEID};
use crate::net::Scb;
use crate::sync::{KernelGuard, UPSafeCell};
use crate::task::current_process;

/// Operations every stream object answers to.
///
/// The default methods stand in for absent table entries: a stream that does
/// not support an operation reports −1 without further ado. `read` and
/// `write` may block, so they receive the kernel-lock guard; `close` never
/// blocks but must still be called with the lock held.
pub trait File: Send + Sync {
    /// Read up to `buf.len()` bytes into `buf`; bytes transferred or −1.
    fn read(&self, _kernel: &mut KernelGuard, _buf: &mut [u8]) -> isize {
        -1
    }
    /// Write up to `buf.len()` bytes from `buf`; bytes transferred or −1.
    fn write(&self, _kernel: &mut KernelGuard, _buf: &[u8]) -> isize {
        -1
    }
    /// Release the stream; invoked when the last FCB reference goes away.
    fn close(&self) -> isize {
        0
    }
    /// Reveal the socket control block behind this stream, if it is one.
    fn as_socket(&self) -> Option<Arc<Scb>> {
        None
    }
}

/// File control block.
///
/// `refs` counts the FIDT slots that point at this FCB, across all processes
/// that inherited it. When the count reaches zero the stream's `close`
/// operation runs; the memory itself lives as long as the last `Arc`.
pub struct Fcb {
    refs: UPSafeCell<usize>,
    file: Arc<dyn File>,
}

impl Fcb {
    pub fn new(file: Arc<dyn File>) -> Self {
        Self {
            refs: unsafe { UPSafeCell::new(1) },
            file,
        }
    }

    pub fn file(&self) -> &Arc<dyn File> {
        &self.file
    }

    /// Account for one more FIDT slot referencing this FCB.
    pub fn incref(&self) {
        *self.refs.exclusive_access() += 1;
    }

    /// Drop one FIDT reference; runs the stream close on the last one.
    ///
    /// Returns the close operation's status, or 0 while references remain.
    pub fn decref(&self) -> isize {
        let remaining = {
            let mut refs = self.refs.exclusive_access();
            assert!(*refs > 0, "FCB refcount underflow");
            *refs -= 1;
            *refs
        };
        if remaining == 0 {
            self.file.close()
        } else {
            0
        }
    }
}

/// Atomically reserve one FIDT slot per stream in the calling process and
/// install the streams. Either every stream gets a fid or none does.
pub fn fcb_reserve(files: Vec<Arc<dyn File>>) -> Option<Vec<Fid>> {
    let process = current_process();
    let mut inner = process.inner_exclusive_access();
    let free: Vec<usize> = inner
        .fid_table
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(fid, _)| fid)
        .take(files.len())
        .collect();
    if free.len() < files.len() {
        return None;
    }
    let mut fids = Vec::with_capacity(files.len());
    for (slot, file) in free.into_iter().zip(files) {
        inner.fid_table[slot] = Some(Arc::new(Fcb::new(file)));
        fids.push(slot as Fid);
    }
    Some(fids)
}

/// Look up a fid in the calling process FIDT.
pub fn get_file(fid: Fid) -> Option<Arc<Fcb>> {
    if fid < 0 || fid as usize >= MAX_FILEID {
        return None;
    }
    let process = current_process();
    let inner = process.inner_exclusive_access();
    inner.fid_table[fid as usize].clone()
}

/// Look up a fid and expect a socket behind it.
pub fn get_socket(fid: Fid) -> Option<Arc<Scb>> {
    get_file(fid).and_then(|fcb| fcb.file().as_socket())
}
