#![allow(dead_code)]

use kernel_sync::{BlockReason, Pid, Scheduler};
use std::collections::{BTreeMap, VecDeque};

/// Round-robin stand-in for the kernel's process table.
///
/// Processes are plain pids; the test decides what each one does when it is
/// dispatched.
#[derive(Debug)]
pub struct RoundRobin {
    running: Pid,
    pub ready: VecDeque<Pid>,
    pub blocked: BTreeMap<Pid, BlockReason>,
}

impl RoundRobin {
    pub fn new(first: u64) -> Self {
        Self {
            running: Pid::new(first),
            ready: VecDeque::new(),
            blocked: BTreeMap::new(),
        }
    }

    /// Adds a process that has never run to the ready queue.
    pub fn spawn(&mut self, pid: u64) {
        self.ready.push_back(Pid::new(pid));
    }

    /// Switches to `pid` without touching the queues.
    pub fn run(&mut self, pid: u64) {
        self.running = Pid::new(pid);
    }

    /// Picks the next ready process and makes it the running one.
    pub fn dispatch(&mut self) -> Option<Pid> {
        let next = self.ready.pop_front()?;
        self.running = next;
        Some(next)
    }

    pub fn is_blocked(&self, pid: u64) -> bool {
        self.blocked.contains_key(&Pid::new(pid))
    }
}

impl Scheduler for RoundRobin {
    fn running(&self) -> Pid {
        self.running
    }

    fn park(&mut self, reason: BlockReason) {
        self.blocked.insert(self.running, reason);
    }

    fn make_ready(&mut self, pid: Pid) {
        assert!(
            self.blocked.remove(&pid).is_some(),
            "{pid:?} woken while not blocked"
        );
        self.ready.push_back(pid);
    }
}
