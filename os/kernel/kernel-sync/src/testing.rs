use crate::ids::Pid;
use crate::wait_queue::{BlockReason, Scheduler};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// Records blocks and wake-ups without dispatching anything.
#[derive(Debug)]
pub struct FakeScheduler {
    pub running: Pid,
    pub blocked: BTreeMap<Pid, BlockReason>,
    pub ready: Vec<Pid>,
}

impl FakeScheduler {
    pub fn new(running: u64) -> Self {
        Self {
            running: Pid::new(running),
            blocked: BTreeMap::new(),
            ready: Vec::new(),
        }
    }

    pub fn run(&mut self, pid: u64) {
        self.running = Pid::new(pid);
    }
}

impl Scheduler for FakeScheduler {
    fn running(&self) -> Pid {
        self.running
    }

    fn park(&mut self, reason: BlockReason) {
        self.blocked.insert(self.running, reason);
    }

    fn make_ready(&mut self, pid: Pid) {
        self.blocked.remove(&pid);
        self.ready.push(pid);
    }
}
