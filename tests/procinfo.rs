//! The procinfo stream: one record per table occupant, FREE slots skipped,
//! and the FIDT limits around reserving its cursor.

use minos::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn zombie_child(_args: &[u8]) -> i32 {
    5
}

fn procinfo_init(args: &[u8]) -> i32 {
    assert_eq!(args, b"ip-args");
    let cpid = sys_exec(Some(zombie_child), b"zc-args");
    assert_ne!(cpid, NOPROC);
    // give the child time to become a zombie; it stays one until reaped
    std::thread::sleep(std::time::Duration::from_millis(50));

    let fid = sys_openinfo();
    assert_ne!(fid, NOFILE);
    // a record does not fit into a small buffer
    let mut small = [0u8; 8];
    assert_eq!(sys_read(fid, &mut small), -1);

    let mut buf = [0u8; PROCINFO_SIZE];
    let mut records = Vec::new();
    loop {
        let n = sys_read(fid, &mut buf);
        if n == -1 {
            break;
        }
        assert_eq!(n, PROCINFO_SIZE as isize);
        records.push(ProcInfo::from_bytes(&buf));
    }
    // idle, init, and the zombie; nothing else
    assert_eq!(records.len(), 3);

    let idle = records.iter().find(|r| r.pid == 0).unwrap();
    assert_eq!(idle.ppid, NOPROC);
    assert_eq!(idle.alive, 1);
    assert_eq!(idle.thread_count, 0);
    assert_eq!(idle.main_task, 0);
    assert_eq!(idle.argl, 0);

    let me = records.iter().find(|r| r.pid == 1).unwrap();
    assert_eq!(me.ppid, NOPROC);
    assert_eq!(me.alive, 1);
    assert_eq!(me.thread_count, 1);
    assert_eq!(me.main_task, procinfo_init as Task as usize);
    assert_eq!(me.argl, 7);
    assert_eq!(&me.args[..7], b"ip-args");

    let zombie = records.iter().find(|r| r.pid == cpid).unwrap();
    assert_eq!(zombie.ppid, 1);
    assert_eq!(zombie.alive, 0);
    assert_eq!(zombie.thread_count, 0);
    assert_eq!(zombie.main_task, zombie_child as Task as usize);
    // teardown released the argument buffer with the rest of the process
    assert_eq!(zombie.argl, 0);

    // the stream is read-only
    assert_eq!(sys_write(fid, b"x"), -1);
    assert_eq!(sys_close(fid), 0);

    let mut status = -1;
    assert_eq!(sys_waitchild(cpid, Some(&mut status)), cpid);
    assert_eq!(status, 5);
    0
}

#[test]
fn procinfo_walks_the_process_table() {
    init_logger();
    assert_eq!(boot(procinfo_init, b"ip-args"), 0);
}

fn exhaustion_init(_args: &[u8]) -> i32 {
    let mut fids = Vec::new();
    for _ in 0..MAX_FILEID {
        let fid = sys_openinfo();
        assert_ne!(fid, NOFILE);
        fids.push(fid);
    }
    // the FIDT is full now
    assert_eq!(sys_openinfo(), NOFILE);
    let mut pipe = PipeFids::default();
    assert_eq!(sys_pipe(&mut pipe), -1);

    // one slot is not enough for a pipe, two are
    assert_eq!(sys_close(fids.pop().unwrap()), 0);
    assert_eq!(sys_pipe(&mut pipe), -1);
    assert_eq!(sys_close(fids.pop().unwrap()), 0);
    assert_eq!(sys_pipe(&mut pipe), 0);

    for fid in fids {
        assert_eq!(sys_close(fid), 0);
    }
    assert_eq!(sys_close(pipe.read), 0);
    assert_eq!(sys_close(pipe.write), 0);
    0
}

#[test]
fn fid_reservation_is_all_or_nothing() {
    init_logger();
    assert_eq!(boot(exhaustion_init, &[]), 0);
}
