//! Process identifiers.

use kernel_sync::Pid;

/// Hands out process ids and takes them back when a process is destroyed.
///
/// The kernel asks for an id once per process and writes it to the region 1
/// page table base register whenever that process' address space becomes
/// active. An id is retired only after its process is gone for good, so a
/// live id is never handed out twice.
pub trait PidAllocator {
    fn new_pid(&mut self) -> Pid;

    fn retire_pid(&mut self, pid: Pid);
}

/// Counts up from 1 and never reuses an id.
#[derive(Debug, Clone)]
pub struct SequentialPidAllocator {
    next: u64,
    live: usize,
}

impl SequentialPidAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1, live: 0 }
    }

    /// Ids handed out and not yet retired.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }
}

impl Default for SequentialPidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PidAllocator for SequentialPidAllocator {
    fn new_pid(&mut self) -> Pid {
        let pid = Pid::new(self.next);
        self.next += 1;
        self.live += 1;
        pid
    }

    fn retire_pid(&mut self, _pid: Pid) {
        self.live = self.live.saturating_sub(1);
    }
}
