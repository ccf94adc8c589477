//! Thread scenarios: join/detach semantics, tid validity, and explicit
//! thread exit.

use std::time::{Duration, Instant};

use minos::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn encode_tid(tid: Tid) -> [u8; 8] {
    (tid as u64).to_ne_bytes()
}

fn decode_tid(args: &[u8]) -> Tid {
    u64::from_ne_bytes(args[..8].try_into().unwrap()) as Tid
}

fn sleepy_seven(_args: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(50));
    7
}

fn join_init(_args: &[u8]) -> i32 {
    let tid = sys_create_thread(Some(sleepy_seven), &[]);
    assert_ne!(tid, NOTHREAD);
    let mut status = -1;
    assert_eq!(sys_thread_join(tid, Some(&mut status)), 0);
    assert_eq!(status, 7);
    // the tid was reclaimed by the successful join
    assert_eq!(sys_thread_join(tid, None), -1);
    0
}

#[test]
fn join_collects_the_exit_value_exactly_once() {
    init_logger();
    assert_eq!(boot(join_init, &[]), 0);
}

fn bogus_join_init(_args: &[u8]) -> i32 {
    // a null task creates nothing
    assert_eq!(sys_create_thread(None, &[]), NOTHREAD);
    // joining yourself, nothing, or a never-issued tid all fail
    assert_eq!(sys_thread_join(sys_thread_self(), None), -1);
    assert_eq!(sys_thread_join(NOTHREAD, None), -1);
    assert_eq!(sys_thread_join(123456, None), -1);
    assert_eq!(sys_thread_detach(NOTHREAD), -1);
    assert_eq!(sys_thread_detach(123456), -1);
    0
}

#[test]
fn invalid_thread_ids_are_rejected() {
    init_logger();
    assert_eq!(boot(bogus_join_init, &[]), 0);
}

fn quiet_sleeper(_args: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(100));
    9
}

fn detach_init(_args: &[u8]) -> i32 {
    let tid = sys_create_thread(Some(quiet_sleeper), &[]);
    assert_ne!(tid, NOTHREAD);
    assert_eq!(sys_thread_detach(tid), 0);
    // once detached, no join may succeed
    assert_eq!(sys_thread_join(tid, None), -1);
    // detaching again is harmless while the thread lives
    assert_eq!(sys_thread_detach(tid), 0);
    0
}

#[test]
fn detached_threads_cannot_be_joined() {
    init_logger();
    assert_eq!(boot(detach_init, &[]), 0);
}

fn slow_target(_args: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(300));
    1
}

fn detacher(args: &[u8]) -> i32 {
    let tid = decode_tid(args);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sys_thread_detach(tid), 0);
    0
}

fn detach_race_init(_args: &[u8]) -> i32 {
    let target = sys_create_thread(Some(slow_target), &[]);
    assert_ne!(target, NOTHREAD);
    let helper = sys_create_thread(Some(detacher), &encode_tid(target));
    assert_ne!(helper, NOTHREAD);

    let started = Instant::now();
    // blocked join, woken by the detach, not by the target's exit
    assert_eq!(sys_thread_join(target, None), -1);
    assert!(started.elapsed() < Duration::from_millis(250));

    let mut status = -1;
    assert_eq!(sys_thread_join(helper, Some(&mut status)), 0);
    assert_eq!(status, 0);
    0
}

#[test]
fn detach_wakes_blocked_joiners() {
    init_logger();
    assert_eq!(boot(detach_race_init, &[]), 0);
}

fn exits_five(_args: &[u8]) -> i32 {
    sys_thread_exit(5)
}

fn quick_one(_args: &[u8]) -> i32 {
    1
}

fn exit_paths_init(_args: &[u8]) -> i32 {
    // explicit ThreadExit mid-task
    let tid = sys_create_thread(Some(exits_five), &[]);
    assert_ne!(tid, NOTHREAD);
    let mut status = -1;
    assert_eq!(sys_thread_join(tid, Some(&mut status)), 0);
    assert_eq!(status, 5);

    // joining an already-exited thread succeeds without blocking
    let tid = sys_create_thread(Some(quick_one), &[]);
    assert_ne!(tid, NOTHREAD);
    std::thread::sleep(Duration::from_millis(50));
    // an exited thread cannot be detached any more
    assert_eq!(sys_thread_detach(tid), -1);
    let mut status = -1;
    assert_eq!(sys_thread_join(tid, Some(&mut status)), 0);
    assert_eq!(status, 1);
    0
}

#[test]
fn thread_exit_value_reaches_late_joiners() {
    init_logger();
    assert_eq!(boot(exit_paths_init, &[]), 0);
}

fn joiner(args: &[u8]) -> i32 {
    let tid = decode_tid(args);
    let mut status = -1;
    assert_eq!(sys_thread_join(tid, Some(&mut status)), 0);
    status
}

fn patient_seven(_args: &[u8]) -> i32 {
    // slow enough that both joiners are parked before the exit
    std::thread::sleep(Duration::from_millis(200));
    7
}

fn multi_join_init(_args: &[u8]) -> i32 {
    let target = sys_create_thread(Some(patient_seven), &[]);
    assert_ne!(target, NOTHREAD);
    let first = sys_create_thread(Some(joiner), &encode_tid(target));
    let second = sys_create_thread(Some(joiner), &encode_tid(target));
    assert_ne!(first, NOTHREAD);
    assert_ne!(second, NOTHREAD);

    // both joiners observe the same exit value
    let mut status = -1;
    assert_eq!(sys_thread_join(first, Some(&mut status)), 0);
    assert_eq!(status, 7);
    assert_eq!(sys_thread_join(second, Some(&mut status)), 0);
    assert_eq!(status, 7);
    // the last joiner reclaimed the target's PTCB
    assert_eq!(sys_thread_join(target, None), -1);
    0
}

#[test]
fn several_joiners_share_one_exit_value() {
    init_logger();
    assert_eq!(boot(multi_join_init, &[]), 0);
}
