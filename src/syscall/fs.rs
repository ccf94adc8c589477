//! Stream syscalls: read, write, close, and pipe creation.

use std::sync::Arc;

use log::trace;

use crate::config::{Fid, MAX_FILEID};
use crate::fs::pipe::{make_pipe, PipeFids};
use crate::fs::{fcb_reserve, get_file, File};
use crate::sync::kernel_lock;
use crate::task::current_process;

/// Read from a fid into `buf`; bytes read or −1.
pub fn sys_read(fid: Fid, buf: &mut [u8]) -> isize {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_read fid[{}]",
        current_process().getpid(),
        fid
    );
    let fcb = match get_file(fid) {
        Some(fcb) => fcb,
        None => return -1,
    };
    let file = Arc::clone(fcb.file());
    file.read(&mut kernel, buf)
}

/// Write `buf` to a fid; bytes written or −1.
pub fn sys_write(fid: Fid, buf: &[u8]) -> isize {
    let mut kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_write fid[{}]",
        current_process().getpid(),
        fid
    );
    let fcb = match get_file(fid) {
        Some(fcb) => fcb,
        None => return -1,
    };
    let file = Arc::clone(fcb.file());
    file.write(&mut kernel, buf)
}

/// Release a fid. The underlying stream closes when its last fid is gone.
pub fn sys_close(fid: Fid) -> isize {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_close fid[{}]",
        current_process().getpid(),
        fid
    );
    if fid < 0 || fid as usize >= MAX_FILEID {
        return -1;
    }
    let process = current_process();
    let fcb = {
        let mut inner = process.inner_exclusive_access();
        match inner.fid_table[fid as usize].take() {
            Some(fcb) => fcb,
            None => return -1,
        }
    };
    fcb.decref()
}

/// Duplicate `oldfid` onto `newfid`, quietly releasing whatever stream
/// `newfid` referred to before. Both fids then name the same FCB.
pub fn sys_dup2(oldfid: Fid, newfid: Fid) -> isize {
    let _kernel = kernel_lock();
    trace!(
        "kernel:pid[{}] sys_dup2 [{}] -> [{}]",
        current_process().getpid(),
        oldfid,
        newfid
    );
    if oldfid < 0 || oldfid as usize >= MAX_FILEID {
        return -1;
    }
    if newfid < 0 || newfid as usize >= MAX_FILEID {
        return -1;
    }
    let process = current_process();
    let displaced = {
        let mut inner = process.inner_exclusive_access();
        let old_fcb = match &inner.fid_table[oldfid as usize] {
            Some(fcb) => Arc::clone(fcb),
            None => return -1,
        };
        if oldfid == newfid {
            return 0;
        }
        old_fcb.incref();
        inner.fid_table[newfid as usize].replace(old_fcb)
    };
    if let Some(fcb) = displaced {
        fcb.decref();
    }
    0
}

/// Open a pipe for the current process; its two fids are returned through
/// `pipe`. 0 on success, −1 when the FIDT cannot hold two more entries.
pub fn sys_pipe(pipe: &mut PipeFids) -> isize {
    let _kernel = kernel_lock();
    trace!("kernel:pid[{}] sys_pipe", current_process().getpid());
    let (pipe_read, pipe_write) = make_pipe();
    let files: Vec<Arc<dyn File>> = vec![pipe_read, pipe_write];
    match fcb_reserve(files) {
        Some(fids) => {
            pipe.read = fids[0];
            pipe.write = fids[1];
            0
        }
        None => -1,
    }
}
