use crate::SyncError;
use crate::cvar::CvarWait;
use crate::ids::{Handle, Pid};
use crate::wait_queue::{BlockReason, Scheduler, WaitQueue};
use core::task::Poll;
use log::trace;

/// Mesa-style mutual exclusion lock.
///
/// Ownership is keyed on the acquiring pid. Release hands nothing over: it
/// only wakes the oldest waiter, which must run and find the lock free.
#[derive(Debug)]
pub struct Lock {
    handle: Handle,
    owner: Option<Pid>,
    waiters: WaitQueue,
    /// Waiters woken by a release that have not yet rechecked the lock.
    unfulfilled: usize,
    /// Condition variable waiters that released this lock and will take it
    /// back once signalled.
    cvars: usize,
}

impl Lock {
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            owner: None,
            waiters: WaitQueue::new(),
            unfulfilled: 0,
            cvars: 0,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub const fn owner(&self) -> Option<Pid> {
        self.owner
    }

    #[must_use]
    pub const fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }

    #[must_use]
    pub const fn unfulfilled(&self) -> usize {
        self.unfulfilled
    }

    #[must_use]
    pub const fn cvars(&self) -> usize {
        self.cvars
    }

    /// Takes the lock for the running process.
    ///
    /// Returns [`Poll::Pending`] after blocking the caller; the caller comes
    /// back with `resumed` set once a release woke it and calls again. Taking
    /// a lock the caller already holds succeeds.
    pub fn acquire<S: Scheduler + ?Sized>(&mut self, sched: &mut S, resumed: bool) -> Poll<()> {
        let me = sched.running();
        if resumed {
            self.unfulfilled = self.unfulfilled.saturating_sub(1);
        }

        match self.owner {
            Some(owner) if owner != me => {
                trace!("{me:?} waits for lock {} held by {owner:?}", self.handle);
                sched.block(&mut self.waiters, BlockReason::Lock(self.handle));
                Poll::Pending
            }
            _ => {
                self.owner = Some(me);
                Poll::Ready(())
            }
        }
    }

    /// Gives up the lock and wakes the oldest waiter.
    ///
    /// # Errors
    /// [`SyncError::NotOwner`] if the running process does not hold it.
    pub fn release<S: Scheduler + ?Sized>(&mut self, sched: &mut S) -> Result<(), SyncError> {
        if self.owner != Some(sched.running()) {
            return Err(SyncError::NotOwner(self.handle));
        }
        if sched.unblock_head(&mut self.waiters).is_some() {
            self.unfulfilled += 1;
        }
        self.owner = None;
        Ok(())
    }

    pub(crate) const fn park_cvar(&mut self) {
        self.cvars += 1;
    }

    pub(crate) const fn unpark_cvar(&mut self) {
        self.cvars = self.cvars.saturating_sub(1);
    }

    /// Takes the lock back for a condition-variable waiter that was woken.
    ///
    /// Needs nothing but the lock: the condition variable may have been
    /// reclaimed between the signal and this call.
    pub fn finish_cvar_wait<S: Scheduler + ?Sized>(
        &mut self,
        sched: &mut S,
        stage: &mut CvarWait,
    ) -> Poll<()> {
        debug_assert_ne!(*stage, CvarWait::Release, "waiter never slept");
        let acquired = if *stage == CvarWait::Reacquiring {
            self.acquire(sched, true)
        } else {
            *stage = CvarWait::Reacquiring;
            self.acquire(sched, false)
        };
        if acquired.is_ready() {
            self.unpark_cvar();
        }
        acquired
    }

    /// Whether nothing references the lock any more, so it may be reclaimed.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.owner.is_none() && self.waiters.is_empty() && self.unfulfilled == 0 && self.cvars == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeScheduler;

    #[test]
    fn contended_acquire_blocks_until_release() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(3));
        assert!(lock.acquire(&mut s, false).is_ready());

        s.run(2);
        assert!(lock.acquire(&mut s, false).is_pending());
        assert_eq!(s.blocked.get(&Pid::new(2)), Some(&BlockReason::Lock(Handle::new(3))));

        s.run(1);
        lock.release(&mut s).unwrap();
        assert_eq!(s.ready, [Pid::new(2)]);
        assert_eq!(lock.unfulfilled(), 1);
        assert!(!lock.is_quiescent());

        s.run(2);
        assert!(lock.acquire(&mut s, true).is_ready());
        assert_eq!(lock.owner(), Some(Pid::new(2)));
        assert_eq!(lock.unfulfilled(), 0);
    }

    #[test]
    fn woken_waiter_that_loses_the_race_blocks_again() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        let _ = lock.acquire(&mut s, false);
        s.run(2);
        let _ = lock.acquire(&mut s, false);
        s.run(1);
        lock.release(&mut s).unwrap();

        // 3 gets in before the woken 2 runs.
        s.run(3);
        assert!(lock.acquire(&mut s, false).is_ready());
        s.run(2);
        assert!(lock.acquire(&mut s, true).is_pending());
        assert_eq!(lock.unfulfilled(), 0);
        assert_eq!(lock.waiters().front(), Some(Pid::new(2)));
    }

    #[test]
    fn release_by_non_owner_fails() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        assert_eq!(lock.release(&mut s), Err(SyncError::NotOwner(Handle::new(0))));
        let _ = lock.acquire(&mut s, false);
        s.run(2);
        assert_eq!(lock.release(&mut s), Err(SyncError::NotOwner(Handle::new(0))));
        assert_eq!(lock.owner(), Some(Pid::new(1)));
    }

    #[test]
    fn reacquire_by_owner_is_a_no_op() {
        let mut s = FakeScheduler::new(1);
        let mut lock = Lock::new(Handle::new(0));
        assert!(lock.acquire(&mut s, false).is_ready());
        assert!(lock.acquire(&mut s, false).is_ready());
        lock.release(&mut s).unwrap();
        assert!(lock.is_quiescent());
    }
}
