use crate::SyncError;
use crate::ids::Handle;
use crate::lock::Lock;
use crate::wait_queue::{BlockReason, Scheduler, WaitQueue};
use core::task::Poll;

/// Where a [`CondVar::wait`] call stands between entries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum CvarWait {
    /// Not started: the lock is still held.
    #[default]
    Release,
    /// Queued on the condition variable.
    Sleeping,
    /// Signalled and blocked on the lock.
    Reacquiring,
}

/// Mesa-style condition variable. Holds nothing but its wait queue.
#[derive(Debug)]
pub struct CondVar {
    handle: Handle,
    waiters: WaitQueue,
}

impl CondVar {
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            waiters: WaitQueue::new(),
        }
    }

    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub const fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }

    /// Releases `lock`, sleeps until signalled, and takes `lock` back.
    ///
    /// Call repeatedly with the same `stage` until it is ready. Waking does
    /// not mean the awaited condition holds; callers recheck in a loop.
    pub fn wait<S: Scheduler + ?Sized>(
        &mut self,
        lock: &mut Lock,
        sched: &mut S,
        stage: &mut CvarWait,
    ) -> Poll<Result<(), SyncError>> {
        if *stage != CvarWait::Release {
            return lock.finish_cvar_wait(sched, stage).map(Ok);
        }
        if let Err(e) = lock.release(sched) {
            return Poll::Ready(Err(e));
        }
        lock.park_cvar();
        sched.block(&mut self.waiters, BlockReason::Cvar(self.handle));
        *stage = CvarWait::Sleeping;
        Poll::Pending
    }

    /// Wakes the oldest waiter, if any.
    pub fn signal<S: Scheduler + ?Sized>(&mut self, sched: &mut S) -> bool {
        sched.unblock_head(&mut self.waiters).is_some()
    }

    /// Wakes every waiter.
    pub fn broadcast<S: Scheduler + ?Sized>(&mut self, sched: &mut S) -> usize {
        sched.unblock_all(&mut self.waiters)
    }

    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Pid;
    use crate::testing::FakeScheduler;

    #[test]
    fn wait_releases_sleeps_and_reacquires() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        let mut cv = CondVar::new(Handle::new(1));
        let _ = lock.acquire(&mut s, false);

        let mut stage = CvarWait::default();
        assert!(cv.wait(&mut lock, &mut s, &mut stage).is_pending());
        assert_eq!(stage, CvarWait::Sleeping);
        assert_eq!(lock.owner(), None);
        assert_eq!(lock.cvars(), 1);
        assert!(!lock.is_quiescent());

        // Signaller takes the lock before the waiter runs.
        s.run(2);
        let _ = lock.acquire(&mut s, false);
        assert!(cv.signal(&mut s));
        assert!(cv.is_quiescent());

        s.run(1);
        assert!(cv.wait(&mut lock, &mut s, &mut stage).is_pending());
        assert_eq!(stage, CvarWait::Reacquiring);

        s.run(2);
        lock.release(&mut s).unwrap();
        s.run(1);
        assert_eq!(cv.wait(&mut lock, &mut s, &mut stage), Poll::Ready(Ok(())));
        assert_eq!(lock.owner(), Some(Pid::new(1)));
        assert_eq!(lock.cvars(), 0);
        assert_eq!(lock.unfulfilled(), 0);
    }

    #[test]
    fn wait_without_the_lock_fails_immediately() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        let mut cv = CondVar::new(Handle::new(1));
        let mut stage = CvarWait::default();
        assert_eq!(
            cv.wait(&mut lock, &mut s, &mut stage),
            Poll::Ready(Err(SyncError::NotOwner(Handle::new(0))))
        );
        assert!(cv.waiters().is_empty());
        assert_eq!(lock.cvars(), 0);
    }

    #[test]
    fn woken_waiter_reacquires_after_the_cvar_is_gone() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        let mut cv = CondVar::new(Handle::new(1));
        let _ = lock.acquire(&mut s, false);
        let mut stage = CvarWait::default();
        assert!(cv.wait(&mut lock, &mut s, &mut stage).is_pending());

        s.run(2);
        let _ = lock.acquire(&mut s, false);
        assert!(cv.signal(&mut s));
        assert!(cv.is_quiescent());
        drop(cv);
        assert!(!lock.is_quiescent());

        s.run(1);
        assert!(lock.finish_cvar_wait(&mut s, &mut stage).is_pending());
        assert_eq!(stage, CvarWait::Reacquiring);
        s.run(2);
        lock.release(&mut s).unwrap();
        s.run(1);
        assert_eq!(lock.finish_cvar_wait(&mut s, &mut stage), Poll::Ready(()));
        assert_eq!(lock.owner(), Some(Pid::new(1)));
        assert_eq!(lock.cvars(), 0);
        lock.release(&mut s).unwrap();
        assert!(lock.is_quiescent());
    }

    #[test]
    fn broadcast_wakes_everyone_in_order() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        let mut cv = CondVar::new(Handle::new(1));
        for pid in 1..=3 {
            s.run(pid);
            let _ = lock.acquire(&mut s, false);
            let mut stage = CvarWait::default();
            let _ = cv.wait(&mut lock, &mut s, &mut stage);
        }
        assert_eq!(cv.broadcast(&mut s), 3);
        assert_eq!(s.ready, [Pid::new(1), Pid::new(2), Pid::new(3)]);
        assert!(!cv.signal(&mut s));
    }
}
