//! A read-only stream over the process table.
//!
//! Every `Read` yields one fixed-size [`ProcInfo`] record and advances a
//! cursor past the free slots; −1 marks the end of the table. The stream is
//! a snapshot-per-record affair: records describe the table as it is at the
//! moment of each read.

use std::sync::Arc;

use crate::config::{Fid, MAX_ARG_PAYLOAD, NOFILE, NOPROC};
use crate::sync::{KernelGuard, UPSafeCell};
use crate::task::{ProcState, PROC_TABLE};

use super::{fcb_reserve, File};

/// One record of the procinfo stream.
///
/// All fields are word-sized (plus the raw argument payload), so the struct
/// has no padding and can travel through a byte buffer as-is.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProcInfo {
    pub pid: usize,
    /// `NOPROC` for the parentless pids 0 and 1
    pub ppid: usize,
    /// 1 while alive, 0 once a zombie
    pub alive: usize,
    pub thread_count: usize,
    /// entry point of the main task, 0 for the idle process
    pub main_task: usize,
    /// full length of the argument buffer
    pub argl: usize,
    /// the first `MAX_ARG_PAYLOAD` argument bytes
    pub args: [u8; MAX_ARG_PAYLOAD],
}

/// Byte size of one procinfo record.
pub const PROCINFO_SIZE: usize = core::mem::size_of::<ProcInfo>();

impl ProcInfo {
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(self as *const ProcInfo as *const u8, PROCINFO_SIZE)
        }
    }

    /// Rebuild a record from the bytes a `Read` produced.
    pub fn from_bytes(bytes: &[u8]) -> ProcInfo {
        assert!(bytes.len() >= PROCINFO_SIZE);
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const ProcInfo) }
    }
}

/// Cursor stream over the process table.
pub struct ProcInfoStream {
    cursor: UPSafeCell<usize>,
}

impl ProcInfoStream {
    pub fn new() -> Self {
        Self {
            cursor: unsafe { UPSafeCell::new(0) },
        }
    }
}

impl File for ProcInfoStream {
    fn read(&self, _kernel: &mut KernelGuard, buf: &mut [u8]) -> isize {
        if buf.len() < PROCINFO_SIZE {
            return -1;
        }
        let mut cursor = self.cursor.exclusive_access();
        let table = PROC_TABLE.exclusive_access();
        while *cursor < table.len() {
            let slot = &table[*cursor];
            *cursor += 1;
            let pcb = match slot {
                Some(pcb) => pcb,
                // bypass the free table slots
                None => continue,
            };
            let inner = pcb.inner_exclusive_access();
            let mut record = ProcInfo {
                pid: pcb.getpid(),
                ppid: inner
                    .parent
                    .as_ref()
                    .and_then(|weak| weak.upgrade())
                    .map_or(NOPROC, |parent| parent.getpid()),
                alive: if inner.pstate == ProcState::Alive { 1 } else { 0 },
                thread_count: inner.thread_count,
                main_task: inner.main_task.map_or(0, |task| task as usize),
                argl: inner.args.len(),
                args: [0; MAX_ARG_PAYLOAD],
            };
            let payload = inner.args.len().min(MAX_ARG_PAYLOAD);
            record.args[..payload].copy_from_slice(&inner.args[..payload]);
            buf[..PROCINFO_SIZE].copy_from_slice(record.as_bytes());
            return PROCINFO_SIZE as isize;
        }
        // no more ALIVE or ZOMBIE processes
        -1
    }
}

/// Reserve a fid for a fresh procinfo cursor in the calling process.
pub fn open_info() -> Fid {
    let stream: Arc<dyn File> = Arc::new(ProcInfoStream::new());
    match fcb_reserve(vec![stream]) {
        Some(fids) => fids[0],
        None => NOFILE,
    }
}
