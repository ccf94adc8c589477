//! IPC pipe: a bounded circular byte buffer with a reader half and a
//! writer half.
//!
//! The two ends are separate stream objects sharing one control block.
//! Readers block on `has_data`, writers on `has_space`; closing either half
//! broadcasts the opposite condition so every blocked party wakes up and
//! re-checks. The control block is freed once both halves are gone.

use std::sync::Arc;

use log::trace;

use crate::config::{Fid, PIPE_BUFFER_SIZE};
use crate::sync::{Condvar, KernelGuard, UPSafeCell};

use super::File;

/// The fid pair returned by `sys_pipe`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipeFids {
    pub read: Fid,
    pub write: Fid,
}

/// This is a cyclic queue.
struct PipeRingBuffer {
    arr: Vec<u8>,
    /// index of the next byte to read
    head: usize,
    /// index of the next byte to write
    tail: usize,
    /// number of buffered bytes; disambiguates head == tail
    len: usize,
    reader_closed: bool,
    writer_closed: bool,
}

impl PipeRingBuffer {
    fn new() -> Self {
        Self {
            arr: vec![0; PIPE_BUFFER_SIZE],
            head: 0,
            tail: 0,
            len: 0,
            reader_closed: false,
            writer_closed: false,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.arr[self.tail] = byte;
        self.tail = (self.tail + 1) % PIPE_BUFFER_SIZE;
        self.len += 1;
    }

    /// The caller must make sure the buffer is not empty.
    fn read_byte(&mut self) -> u8 {
        let c = self.arr[self.head];
        self.head = (self.head + 1) % PIPE_BUFFER_SIZE;
        self.len -= 1;
        c
    }

    fn is_full(&self) -> bool {
        self.len == PIPE_BUFFER_SIZE
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Pipe control block, jointly owned by the two endpoint streams
/// (and, for sockets, by the two peer SCBs of a connection).
pub struct PipeCb {
    /// wakes writers when room appears or the reader goes away
    has_space: Condvar,
    /// wakes readers when bytes appear or the writer goes away
    has_data: Condvar,
    buffer: UPSafeCell<PipeRingBuffer>,
}

impl PipeCb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            has_space: Condvar::new(),
            has_data: Condvar::new(),
            buffer: unsafe { UPSafeCell::new(PipeRingBuffer::new()) },
        })
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Blocks while the pipe is empty and the writer is still open. Returns
    /// the number of bytes read, which is short only when the writer closed;
    /// 0 therefore means end of stream. −1 if the request is empty or the
    /// reading half has already been closed.
    pub fn read(&self, kernel: &mut KernelGuard, buf: &mut [u8]) -> isize {
        if buf.is_empty() {
            return -1;
        }
        if self.buffer.exclusive_access().reader_closed {
            return -1;
        }
        let mut already_read = 0usize;
        while already_read < buf.len() {
            let mut ring = self.buffer.exclusive_access();
            if ring.is_empty() {
                if ring.writer_closed {
                    return already_read as isize;
                }
                drop(ring);
                self.has_data.wait(kernel);
                continue;
            }
            buf[already_read] = ring.read_byte();
            already_read += 1;
            self.has_space.broadcast();
        }
        already_read as isize
    }

    /// Write up to `buf.len()` bytes.
    ///
    /// Blocks while the buffer is full and the reader is still open. If the
    /// reader disappears mid-transfer the count so far is returned; −1 only
    /// when nothing could be transferred at all.
    pub fn write(&self, kernel: &mut KernelGuard, buf: &[u8]) -> isize {
        if buf.is_empty() {
            return -1;
        }
        {
            let ring = self.buffer.exclusive_access();
            if ring.writer_closed || ring.reader_closed {
                return -1;
            }
        }
        let mut already_write = 0usize;
        while already_write < buf.len() {
            let mut ring = self.buffer.exclusive_access();
            if ring.reader_closed {
                // nobody will ever drain the buffer again
                return if already_write == 0 {
                    -1
                } else {
                    already_write as isize
                };
            }
            if ring.is_full() {
                drop(ring);
                self.has_space.wait(kernel);
                continue;
            }
            ring.write_byte(buf[already_write]);
            already_write += 1;
            self.has_data.broadcast();
        }
        already_write as isize
    }

    /// Close the reading half. Blocked writers wake and observe it.
    pub fn close_reader(&self) -> isize {
        let mut ring = self.buffer.exclusive_access();
        if ring.reader_closed {
            return -1;
        }
        ring.reader_closed = true;
        drop(ring);
        self.has_space.broadcast();
        0
    }

    /// Close the writing half. Blocked readers wake and observe EOF.
    pub fn close_writer(&self) -> isize {
        let mut ring = self.buffer.exclusive_access();
        if ring.writer_closed {
            return -1;
        }
        ring.writer_closed = true;
        drop(ring);
        self.has_data.broadcast();
        0
    }
}

/// One end of a pipe, exposed as a stream object.
pub struct Pipe {
    readable: bool,
    writable: bool,
    pipe: Arc<PipeCb>,
}

impl Pipe {
    /// create readable pipe end
    pub fn read_end_with_buffer(pipe: Arc<PipeCb>) -> Self {
        Self {
            readable: true,
            writable: false,
            pipe,
        }
    }
    /// create writable pipe end
    pub fn write_end_with_buffer(pipe: Arc<PipeCb>) -> Self {
        Self {
            readable: false,
            writable: true,
            pipe,
        }
    }
}

/// Return (read_end, write_end)
pub fn make_pipe() -> (Arc<Pipe>, Arc<Pipe>) {
    let pipe = PipeCb::new();
    let read_end = Arc::new(Pipe::read_end_with_buffer(pipe.clone()));
    let write_end = Arc::new(Pipe::write_end_with_buffer(pipe));
    (read_end, write_end)
}

impl File for Pipe {
    fn read(&self, kernel: &mut KernelGuard, buf: &mut [u8]) -> isize {
        if !self.readable {
            return -1;
        }
        self.pipe.read(kernel, buf)
    }

    fn write(&self, kernel: &mut KernelGuard, buf: &[u8]) -> isize {
        if !self.writable {
            return -1;
        }
        self.pipe.write(kernel, buf)
    }

    fn close(&self) -> isize {
        trace!("kernel: pipe close ({})", if self.readable { "read end" } else { "write end" });
        if self.readable {
            self.pipe.close_reader()
        } else {
            self.pipe.close_writer()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_wraps_with_modulo_indices() {
        let mut ring = PipeRingBuffer::new();
        // fill, drain half, refill past the wrap point
        for i in 0..PIPE_BUFFER_SIZE {
            ring.write_byte(i as u8);
        }
        assert!(ring.is_full());
        for i in 0..PIPE_BUFFER_SIZE / 2 {
            assert_eq!(ring.read_byte(), i as u8);
        }
        for i in 0..PIPE_BUFFER_SIZE / 2 {
            ring.write_byte(i as u8);
        }
        assert!(ring.is_full());
        let mut expected: Vec<u8> = (PIPE_BUFFER_SIZE / 2..PIPE_BUFFER_SIZE)
            .map(|i| i as u8)
            .collect();
        expected.extend((0..PIPE_BUFFER_SIZE / 2).map(|i| i as u8));
        for byte in expected {
            assert_eq!(ring.read_byte(), byte);
        }
        assert!(ring.is_empty());
        assert_eq!(ring.head, ring.tail);
    }
}
