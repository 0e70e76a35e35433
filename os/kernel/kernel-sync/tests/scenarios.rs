//! Two-process scenarios driven directly against the primitives.

mod common;

use common::RoundRobin;
use core::task::Poll;
use kernel_sync::{BlockReason, CvarWait, Pid, Scheduler, SyncError, SyncObjects};

#[test]
fn pipe_hands_over_a_partial_read_then_the_rest() {
    let mut s = RoundRobin::new(1);
    let mut objs = SyncObjects::new();
    let h = objs.new_pipe();

    let mut done = 0;
    let pipe = objs.pipe_mut(h).unwrap();
    assert_eq!(pipe.write(&mut s, b"hello", &mut done, false), Poll::Ready(5));

    s.run(2);
    let mut buf = [0u8; 3];
    assert_eq!(pipe.read(&mut s, &mut buf, false), Poll::Ready(3));
    assert_eq!(&buf, b"hel");
    assert_eq!(pipe.len(), 2);

    let mut buf = [0u8; 5];
    assert_eq!(pipe.read(&mut s, &mut buf, false), Poll::Ready(2));
    assert_eq!(&buf[..2], b"lo");
    assert!(pipe.is_empty());
    assert!(objs.reclaim(h).is_ok());
}

#[test]
fn lock_ownership_follows_the_acquiring_process() {
    let mut s = RoundRobin::new(1);
    let mut objs = SyncObjects::new();
    let h = objs.new_lock();
    let lock = objs.lock_mut(h).unwrap();

    assert!(lock.acquire(&mut s, false).is_ready());

    // The forked child holds nothing and has to wait.
    s.run(2);
    assert!(lock.acquire(&mut s, false).is_pending());
    assert_eq!(s.blocked[&Pid::new(2)], BlockReason::Lock(h));
    assert_eq!(lock.release(&mut s), Err(SyncError::NotOwner(h)));

    s.run(1);
    lock.release(&mut s).unwrap();
    assert_eq!(s.dispatch(), Some(Pid::new(2)));
    assert!(lock.acquire(&mut s, true).is_ready());
    assert_eq!(lock.owner(), Some(Pid::new(2)));

    assert_eq!(objs.reclaim(h), Err(SyncError::NotQuiescent(h)));
    objs.lock_mut(h).unwrap().release(&mut s).unwrap();
    assert!(objs.reclaim(h).is_ok());
}

#[test]
fn at_most_one_owner_under_round_robin_contention() {
    let mut s = RoundRobin::new(0);
    let mut objs = SyncObjects::new();
    let h = objs.new_lock();
    for pid in 1..=5 {
        s.spawn(pid);
    }

    // Each process takes the lock, holds it for one turn, releases it and
    // does that three times.
    let mut rounds = [0u32; 6];
    let mut holding = [false; 6];
    let mut resumed = [false; 6];
    while let Some(pid) = s.dispatch() {
        let i = pid.as_u64() as usize;
        let lock = objs.lock_mut(h).unwrap();
        if holding[i] {
            lock.release(&mut s).unwrap();
            holding[i] = false;
            rounds[i] += 1;
            if rounds[i] < 3 {
                s.ready.push_back(pid);
            }
            continue;
        }
        match lock.acquire(&mut s, resumed[i]) {
            Poll::Ready(()) => {
                assert_eq!(holding.iter().filter(|&&h| h).count(), 0);
                holding[i] = true;
                resumed[i] = false;
                s.ready.push_back(pid);
            }
            Poll::Pending => resumed[i] = true,
        }
    }

    assert_eq!(&rounds[1..], &[3; 5]);
    assert!(objs.reclaim(h).is_ok());
}

#[test]
fn condition_wait_round_trip_through_the_registry() {
    let mut s = RoundRobin::new(1);
    let mut objs = SyncObjects::new();
    let l = objs.new_lock();
    let c = objs.new_cvar();

    assert!(objs.lock_mut(l).unwrap().acquire(&mut s, false).is_ready());
    let mut stage = CvarWait::default();
    let (cv, lock) = objs.cvar_and_lock_mut(c, l).unwrap();
    assert!(cv.wait(lock, &mut s, &mut stage).is_pending());

    assert_eq!(objs.reclaim(l), Err(SyncError::NotQuiescent(l)));
    assert_eq!(objs.reclaim(c), Err(SyncError::NotQuiescent(c)));

    s.run(2);
    assert!(objs.cvar_mut(c).unwrap().signal(&mut s));
    assert_eq!(s.dispatch(), Some(Pid::new(1)));
    let (cv, lock) = objs.cvar_and_lock_mut(c, l).unwrap();
    assert_eq!(cv.wait(lock, &mut s, &mut stage), Poll::Ready(Ok(())));

    assert!(objs.reclaim(c).is_ok());
    objs.lock_mut(l).unwrap().release(&mut s).unwrap();
    assert!(objs.reclaim(l).is_ok());
}
