//! Process lifecycle scenarios: exit-status plumbing, descriptor
//! inheritance across Exec, waiting, orphan adoption, and multi-thread
//! process teardown.

use minos::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn encode_pipe(pipe: PipeFids) -> [u8; 16] {
    let mut args = [0u8; 16];
    args[..8].copy_from_slice(&(pipe.read as i64).to_ne_bytes());
    args[8..].copy_from_slice(&(pipe.write as i64).to_ne_bytes());
    args
}

fn decode_pipe(args: &[u8]) -> PipeFids {
    PipeFids {
        read: i64::from_ne_bytes(args[..8].try_into().unwrap()) as Fid,
        write: i64::from_ne_bytes(args[8..16].try_into().unwrap()) as Fid,
    }
}

fn exit_status_init(_args: &[u8]) -> i32 {
    42
}

#[test]
fn boot_returns_the_init_exit_status() {
    init_logger();
    assert_eq!(boot(exit_status_init, &[]), 42);
}

fn child_reader(args: &[u8]) -> i32 {
    let pipe = decode_pipe(args);
    // drop the inherited write end, or EOF never comes
    assert_eq!(sys_close(pipe.write), 0);
    let mut buf = [0u8; 16];
    let mut total = 0;
    loop {
        let n = sys_read(pipe.read, &mut buf);
        assert!(n >= 0);
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(sys_close(pipe.read), 0);
    total as i32
}

fn inheritance_init(_args: &[u8]) -> i32 {
    let mut pipe = PipeFids::default();
    assert_eq!(sys_pipe(&mut pipe), 0);
    let cpid = sys_exec(Some(child_reader), &encode_pipe(pipe));
    assert_ne!(cpid, NOPROC);

    // the child shares the pipe through its inherited FIDT
    assert_eq!(sys_close(pipe.read), 0);
    assert_eq!(sys_write(pipe.write, b"ABC"), 3);
    assert_eq!(sys_close(pipe.write), 0);

    let mut status = -1;
    assert_eq!(sys_waitchild(cpid, Some(&mut status)), cpid);
    assert_eq!(status, 3);
    0
}

#[test]
fn exec_child_inherits_open_files() {
    init_logger();
    assert_eq!(boot(inheritance_init, &[]), 0);
}

fn waitchild_errors_init(_args: &[u8]) -> i32 {
    // no children at all
    assert_eq!(sys_waitchild(NOPROC, None), NOPROC);
    // a pid that exists but is no child of ours (pid 1 is us)
    assert_eq!(sys_waitchild(1, None), NOPROC);
    // a free pid and one beyond the table
    assert_eq!(sys_waitchild(4096, None), NOPROC);
    assert_eq!(sys_waitchild(MAX_PROC + 7, None), NOPROC);
    0
}

#[test]
fn waitchild_rejects_non_children_without_blocking() {
    init_logger();
    assert_eq!(boot(waitchild_errors_init, &[]), 0);
}

fn pid_child(_args: &[u8]) -> i32 {
    assert_eq!(sys_getppid(), 1);
    assert!(sys_getpid() >= 2);
    0
}

fn pid_init(_args: &[u8]) -> i32 {
    assert_eq!(sys_getpid(), 1);
    assert_eq!(sys_getppid(), NOPROC);
    let cpid = sys_exec(Some(pid_child), &[]);
    assert_ne!(cpid, NOPROC);
    let mut status = -1;
    assert_eq!(sys_waitchild(cpid, Some(&mut status)), cpid);
    assert_eq!(status, 0);
    0
}

#[test]
fn pids_and_parent_pids_line_up() {
    init_logger();
    assert_eq!(boot(pid_init, &[]), 0);
}

fn grandchild(_args: &[u8]) -> i32 {
    std::thread::sleep(std::time::Duration::from_millis(50));
    7
}

fn short_lived_parent(_args: &[u8]) -> i32 {
    let gpid = sys_exec(Some(grandchild), &[]);
    assert_ne!(gpid, NOPROC);
    // die with the grandchild still running; init adopts it
    gpid as i32
}

fn orphan_init(_args: &[u8]) -> i32 {
    let middle = sys_exec(Some(short_lived_parent), &[]);
    assert_ne!(middle, NOPROC);
    let mut status = -1;
    assert_eq!(sys_waitchild(middle, Some(&mut status)), middle);
    let gpid = status as Pid;

    // the orphan has been reparented to us
    let mut gstatus = -1;
    assert_eq!(sys_waitchild(gpid, Some(&mut gstatus)), gpid);
    assert_eq!(gstatus, 7);
    0
}

#[test]
fn orphans_are_adopted_by_init() {
    init_logger();
    assert_eq!(boot(orphan_init, &[]), 0);
}

fn lingering_worker(_args: &[u8]) -> i32 {
    std::thread::sleep(std::time::Duration::from_millis(100));
    0
}

fn multithreaded_child(_args: &[u8]) -> i32 {
    let tid = sys_create_thread(Some(lingering_worker), &[]);
    assert_ne!(tid, NOTHREAD);
    // the main thread leaves first; the process stays alive until the
    // worker is done
    sys_exit(3)
}

fn teardown_init(_args: &[u8]) -> i32 {
    let started = std::time::Instant::now();
    let cpid = sys_exec(Some(multithreaded_child), &[]);
    assert_ne!(cpid, NOPROC);
    let mut status = -1;
    assert_eq!(sys_waitchild(cpid, Some(&mut status)), cpid);
    assert_eq!(status, 3);
    // reaping had to wait for the worker, not just the main thread
    assert!(started.elapsed() >= std::time::Duration::from_millis(80));
    0
}

#[test]
fn process_becomes_zombie_only_after_last_thread() {
    init_logger();
    assert_eq!(boot(teardown_init, &[]), 0);
}

fn trivial_child(_args: &[u8]) -> i32 {
    0
}

fn pid_recycling_init(_args: &[u8]) -> i32 {
    let first = sys_exec(Some(trivial_child), &[]);
    assert_ne!(first, NOPROC);
    assert_eq!(sys_waitchild(first, None), first);
    // the reaped pid returns to the free list and is handed out again
    let second = sys_exec(Some(trivial_child), &[]);
    assert_eq!(second, first);
    assert_eq!(sys_waitchild(second, None), second);
    0
}

#[test]
fn reaped_pids_are_recycled() {
    init_logger();
    assert_eq!(boot(pid_recycling_init, &[]), 0);
}
