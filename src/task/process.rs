//! Process control blocks, the process table, and the process lifecycle:
//! creation (`Exec`), reaping (`WaitChild`) and termination (`Exit`).
//!
//! PCBs live in a fixed-size table indexed by pid. A table slot holds
//! `None` while the pid is free; an occupied slot keeps the PCB alive from
//! `Exec` until the parent reaps the zombie.

use std::cell::RefMut;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use lazy_static::*;
use log::trace;

use crate::config::{Pid, Task, MAX_FILEID, MAX_PROC, NOPROC};
use crate::fs::Fcb;
use crate::sync::{Condvar, KernelGuard, UPSafeCell};

use super::id::{pid_alloc, reset_allocators, PidHandle};
use super::processor::{current_process, spawn_kernel_thread};
use super::thread::ThreadControlBlock;

/// Lifecycle state of an allocated PCB. A free pid has no PCB at all.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcState {
    /// at least one thread has yet to exit (or the process never had any)
    Alive,
    /// every thread has exited; awaiting reaping by the parent
    Zombie,
}

/// Process control block.
pub struct ProcessControlBlock {
    /// pid, doubling as the process-table index
    pub pid: PidHandle,
    /// signalled whenever a child of this process exits
    pub child_exit: Condvar,
    inner: UPSafeCell<PcbInner>,
}

pub struct PcbInner {
    pub pstate: ProcState,
    /// `None` for pid 0 (idle) and pid 1 (init)
    pub parent: Option<Weak<ProcessControlBlock>>,
    /// every child, alive or zombie
    pub children: Vec<Arc<ProcessControlBlock>>,
    /// the zombie subset, in exit order
    pub exited_children: VecDeque<Arc<ProcessControlBlock>>,
    /// entry point of the main thread; `None` for the idle process
    pub main_task: Option<Task>,
    /// process-owned copy of the `Exec` argument bytes
    pub args: Vec<u8>,
    /// the file-id table
    pub fid_table: Vec<Option<Arc<Fcb>>>,
    /// every thread whose PTCB has not been reclaimed yet
    pub threads: Vec<Arc<ThreadControlBlock>>,
    /// threads that have not exited
    pub thread_count: usize,
    pub main_thread: Option<Arc<ThreadControlBlock>>,
    pub exitval: i32,
}

impl ProcessControlBlock {
    pub fn getpid(&self) -> Pid {
        self.pid.0
    }

    pub fn inner_exclusive_access(&self) -> RefMut<'_, PcbInner> {
        self.inner.exclusive_access()
    }
}

lazy_static! {
    /// The process table. Slot `pid` is `None` while `pid` is free.
    pub static ref PROC_TABLE: UPSafeCell<Vec<Option<Arc<ProcessControlBlock>>>> =
        unsafe { UPSafeCell::new(Vec::new()) };
}

/// Look a pid up in the process table.
pub fn get_pcb(pid: Pid) -> Option<Arc<ProcessControlBlock>> {
    PROC_TABLE
        .exclusive_access()
        .get(pid)
        .and_then(|slot| slot.clone())
}

/// Set up the process table and start the idle process.
///
/// Called once per boot, before any other process exists. The idle process
/// must land on pid 0: it has no parent, no threads and no task, it merely
/// occupies the slot the scheduler owns.
pub fn initialize_processes() {
    *PROC_TABLE.exclusive_access() = (0..MAX_PROC).map(|_| None).collect();
    reset_allocators();
    let idle = exec_process(None, &[]);
    assert_eq!(idle, 0, "the scheduler process does not have pid==0");
}

/// System call to create a new process.
///
/// The new process inherits the caller's open files and receives its own
/// copy of `args`. With `call == None` no thread is created (only the idle
/// process is built this way). Returns the new pid, or `NOPROC` when the
/// process table is exhausted.
pub fn exec_process(call: Option<Task>, args: &[u8]) -> Pid {
    let pid_handle = match pid_alloc() {
        Some(handle) => handle,
        // we have run out of pids
        None => return NOPROC,
    };
    let pid = pid_handle.0;
    trace!("kernel: exec_process -> pid[{}]", pid);

    let mut fid_table: Vec<Option<Arc<Fcb>>> = (0..MAX_FILEID).map(|_| None).collect();
    let mut parent: Option<Weak<ProcessControlBlock>> = None;
    // Processes with pid <= 1 (the scheduler and the init process) are
    // parentless and are treated specially.
    if pid > 1 {
        let curproc = current_process();
        let cur_inner = curproc.inner_exclusive_access();
        for (fid, slot) in cur_inner.fid_table.iter().enumerate() {
            if let Some(fcb) = slot {
                fcb.incref();
                fid_table[fid] = Some(Arc::clone(fcb));
            }
        }
        drop(cur_inner);
        parent = Some(Arc::downgrade(&curproc));
    }

    let pcb = Arc::new(ProcessControlBlock {
        pid: pid_handle,
        child_exit: Condvar::new(),
        inner: unsafe {
            UPSafeCell::new(PcbInner {
                pstate: ProcState::Alive,
                parent,
                children: Vec::new(),
                exited_children: VecDeque::new(),
                main_task: call,
                args: args.to_vec(),
                fid_table,
                threads: Vec::new(),
                thread_count: 0,
                main_thread: None,
                exitval: 0,
            })
        },
    });
    PROC_TABLE.exclusive_access()[pid] = Some(Arc::clone(&pcb));
    if pid > 1 {
        current_process()
            .inner_exclusive_access()
            .children
            .push(Arc::clone(&pcb));
    }

    // Create and wake up the main thread last, so that it can only ever
    // observe a fully initialised PCB.
    if let Some(task) = call {
        let main_thread = ThreadControlBlock::new(&pcb, task, args.to_vec(), true);
        {
            let mut inner = pcb.inner_exclusive_access();
            inner.threads.push(Arc::clone(&main_thread));
            inner.thread_count = 1;
            inner.main_thread = Some(Arc::clone(&main_thread));
        }
        spawn_kernel_thread(main_thread);
    }

    pid
}

/// Copy the exit status out of a zombie, unlink it from its parent and
/// return its pid to the free list.
fn cleanup_zombie(
    parent: &Arc<ProcessControlBlock>,
    child: Arc<ProcessControlBlock>,
    status: Option<&mut i32>,
) {
    {
        let child_inner = child.inner_exclusive_access();
        assert_eq!(child_inner.pstate, ProcState::Zombie);
        if let Some(status) = status {
            *status = child_inner.exitval;
        }
    }
    {
        let mut parent_inner = parent.inner_exclusive_access();
        parent_inner.children.retain(|c| !Arc::ptr_eq(c, &child));
        parent_inner
            .exited_children
            .retain(|c| !Arc::ptr_eq(c, &child));
    }
    PROC_TABLE.exclusive_access()[child.getpid()] = None;
}

/// Wait for any child to exit and reap it.
///
/// Returns `NOPROC` immediately when the caller has no children at all;
/// otherwise blocks until the exited queue is non-empty and reaps its head.
pub fn wait_for_any_child(kernel: &mut KernelGuard, status: Option<&mut i32>) -> Pid {
    let parent = current_process();
    let child = loop {
        let inner = parent.inner_exclusive_access();
        if inner.children.is_empty() {
            return NOPROC;
        }
        if let Some(child) = inner.exited_children.front().cloned() {
            break child;
        }
        drop(inner);
        parent.child_exit.wait(kernel);
    };
    let cpid = child.getpid();
    cleanup_zombie(&parent, child, status);
    cpid
}

/// Wait for one particular child of the caller to exit and reap it.
pub fn wait_for_specific_child(
    kernel: &mut KernelGuard,
    cpid: Pid,
    status: Option<&mut i32>,
) -> Pid {
    if cpid >= MAX_PROC {
        return NOPROC;
    }
    let parent = current_process();
    let child = match get_pcb(cpid) {
        Some(child) => child,
        None => return NOPROC,
    };
    {
        let child_inner = child.inner_exclusive_access();
        let is_mine = child_inner
            .parent
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map_or(false, |p| Arc::ptr_eq(&p, &parent));
        if !is_mine {
            return NOPROC;
        }
    }

    // Ok, the child is a legal child of mine. Wait for it to exit.
    loop {
        let child_inner = child.inner_exclusive_access();
        if child_inner.pstate == ProcState::Zombie {
            break;
        }
        drop(child_inner);
        parent.child_exit.wait(kernel);
    }

    // another thread of this process may have raced us to the reaping
    let still_mine = parent
        .inner_exclusive_access()
        .children
        .iter()
        .any(|c| Arc::ptr_eq(c, &child));
    if !still_mine {
        return NOPROC;
    }
    cleanup_zombie(&parent, child, status);
    cpid
}

/// Terminate the calling process with status `exitval`.
///
/// The init process first drains all of its children, so that no zombie
/// outlives the boot. Termination itself goes through the thread-exit path
/// of the calling thread; process teardown happens there once the last
/// thread is gone.
pub fn exit_current(mut kernel: KernelGuard, exitval: i32) -> ! {
    let curproc = current_process();
    curproc.inner_exclusive_access().exitval = exitval;
    if curproc.getpid() == 1 {
        while wait_for_any_child(&mut kernel, None) != NOPROC {}
    }
    super::thread::thread_exit_current(kernel, exitval)
}

/// Drop the tables of a finished boot and report the init exit status.
///
/// Must only run after the last kernel thread has terminated.
pub fn shutdown_tables() -> i32 {
    let status = {
        let table = PROC_TABLE.exclusive_access();
        table
            .get(1)
            .and_then(|slot| slot.as_ref())
            .map(|init| init.inner_exclusive_access().exitval)
            .unwrap_or(-1)
    };
    PROC_TABLE.exclusive_access().clear();
    crate::net::clear_port_map();
    reset_allocators();
    status
}
