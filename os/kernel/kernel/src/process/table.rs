use super::pcb::{Pcb, ProcessState};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use kernel_sync::{BlockReason, Pid, Scheduler, WaitQueue};
use log::trace;

/// Every process, keyed by pid, plus the scheduling queues that link them.
///
/// The running process always has an entry; that is what makes
/// [`current`](Self::current) infallible.
#[derive(Debug)]
pub struct ProcessTable {
    pub(crate) pcbs: BTreeMap<Pid, Pcb>,
    pub(crate) running: Pid,
    pub(crate) idle: Pid,
    pub(crate) ready: VecDeque<Pid>,
    /// Parents blocked in wait.
    pub(crate) waiting: WaitQueue,
    pub(crate) delayed: Vec<Pid>,
    /// Terminated processes nobody will wait for.
    pub(crate) orphans: VecDeque<Pid>,
}

impl ProcessTable {
    /// A table whose only entry is `first`, which is running.
    pub(crate) fn new(mut first: Pcb, idle: Pid) -> Self {
        let running = first.pid();
        first.state = ProcessState::Running;
        let mut pcbs = BTreeMap::new();
        pcbs.insert(running, first);
        Self {
            pcbs,
            running,
            idle,
            ready: VecDeque::new(),
            waiting: WaitQueue::new(),
            delayed: Vec::new(),
            orphans: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.pcbs.get(&pid)
    }

    pub(crate) fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.pcbs.get_mut(&pid)
    }

    pub(crate) fn insert(&mut self, pcb: Pcb) {
        self.pcbs.insert(pcb.pid(), pcb);
    }

    pub(crate) fn remove(&mut self, pid: Pid) -> Option<Pcb> {
        self.pcbs.remove(&pid)
    }

    #[must_use]
    pub fn current(&self) -> &Pcb {
        self.pcbs
            .get(&self.running)
            .unwrap_or_else(|| unreachable!("running process has no control block"))
    }

    pub(crate) fn current_mut(&mut self) -> &mut Pcb {
        self.pcbs
            .get_mut(&self.running)
            .unwrap_or_else(|| unreachable!("running process has no control block"))
    }

    #[must_use]
    pub const fn idle(&self) -> Pid {
        self.idle
    }

    /// Number of process control blocks, defunct ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pcbs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcbs.is_empty()
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pcbs.keys().copied()
    }

    /// The ready queue, head first.
    pub fn ready(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready.iter().copied()
    }

    pub fn waiting(&self) -> impl Iterator<Item = Pid> + '_ {
        self.waiting.iter()
    }

    pub fn delayed(&self) -> impl Iterator<Item = Pid> + '_ {
        self.delayed.iter().copied()
    }

    pub fn orphans(&self) -> impl Iterator<Item = Pid> + '_ {
        self.orphans.iter().copied()
    }

    /// Blocks the running process until one of its children exits.
    pub(crate) fn block_waiting(&mut self) {
        let me = self.running;
        self.waiting.push_back(me);
        self.park(BlockReason::Wait);
    }

    /// Wakes `parent` if it is blocked in wait.
    pub(crate) fn wake_waiting(&mut self, parent: Pid) -> bool {
        let found = self.waiting.remove(parent);
        if found {
            self.make_ready(parent);
        }
        found
    }
}

impl Scheduler for ProcessTable {
    fn running(&self) -> Pid {
        self.running
    }

    fn park(&mut self, reason: BlockReason) {
        trace!("{:?} blocks on {reason:?}", self.running);
        self.current_mut().state = ProcessState::Blocked(reason);
    }

    fn make_ready(&mut self, pid: Pid) {
        match self.pcbs.get_mut(&pid) {
            Some(pcb) => {
                pcb.state = ProcessState::Ready;
                self.ready.push_back(pid);
                trace!("{pid:?} ready");
            }
            None => log::warn!("Ignoring wakeup of unknown {pid:?}"),
        }
    }
}
