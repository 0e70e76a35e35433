//! Wait queues and the scheduler interface every blocking primitive uses.

use crate::ids::{Handle, Pid};
use alloc::collections::VecDeque;

/// What a blocked process is waiting for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockReason {
    /// A child to exit.
    Wait,
    /// A number of clock ticks.
    Delay,
    Lock(Handle),
    Cvar(Handle),
    PipeRead(Handle),
    PipeWrite(Handle),
    /// A line on the terminal.
    TtyRead(usize),
    /// The terminal transmitter.
    TtyWrite(usize),
}

/// FIFO of blocked processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitQueue {
    pids: VecDeque<Pid>,
}

impl WaitQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pids: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, pid: Pid) {
        self.pids.push_back(pid);
    }

    pub fn push_front(&mut self, pid: Pid) {
        self.pids.push_front(pid);
    }

    pub fn pop_front(&mut self) -> Option<Pid> {
        self.pids.pop_front()
    }

    /// Removes `pid` if queued.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.pids.iter().position(|&p| p == pid) {
            Some(i) => {
                self.pids.remove(i);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    #[must_use]
    pub fn front(&self) -> Option<Pid> {
        self.pids.front().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }
}

/// The process-state side of blocking and waking.
///
/// Implementors own the process states; the primitives in this crate own the
/// queues. Blocking never switches by itself: after [`block`](Self::block)
/// the caller returns [`Poll::Pending`](core::task::Poll::Pending) and the
/// kernel dispatches another process. Waking only makes a process ready; it
/// runs when the scheduler next picks it.
pub trait Scheduler {
    /// The process executing kernel code.
    fn running(&self) -> Pid;

    /// Marks the running process blocked.
    fn park(&mut self, reason: BlockReason);

    /// Moves a blocked process to the back of the ready queue.
    fn make_ready(&mut self, pid: Pid);

    /// Blocks the running process at the back of `queue`.
    fn block(&mut self, queue: &mut WaitQueue, reason: BlockReason) {
        queue.push_back(self.running());
        self.park(reason);
    }

    /// Blocks the running process at the front of `queue`, so it is the next
    /// one woken.
    fn block_front(&mut self, queue: &mut WaitQueue, reason: BlockReason) {
        queue.push_front(self.running());
        self.park(reason);
    }

    /// Wakes `pid` if it is in `queue`.
    fn unblock(&mut self, queue: &mut WaitQueue, pid: Pid) -> bool {
        let found = queue.remove(pid);
        if found {
            self.make_ready(pid);
        }
        found
    }

    /// Wakes the oldest waiter, if any.
    fn unblock_head(&mut self, queue: &mut WaitQueue) -> Option<Pid> {
        let pid = queue.pop_front()?;
        self.make_ready(pid);
        Some(pid)
    }

    /// Wakes every waiter in queue order and returns how many there were.
    fn unblock_all(&mut self, queue: &mut WaitQueue) -> usize {
        let mut woken = 0;
        while let Some(pid) = queue.pop_front() {
            self.make_ready(pid);
            woken += 1;
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u64) -> Pid {
        Pid::new(n)
    }

    #[test]
    fn remove_preserves_order() {
        let mut q = WaitQueue::new();
        for n in 1..=4 {
            q.push_back(pid(n));
        }
        assert!(q.remove(pid(2)));
        assert!(!q.remove(pid(2)));
        q.push_front(pid(9));
        assert_eq!(q.iter().collect::<alloc::vec::Vec<_>>(), [pid(9), pid(1), pid(3), pid(4)]);
    }
}
