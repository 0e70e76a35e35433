//! Termination and final destruction.
//!
//! Termination happens on the dying process' own kernel stack, so it only
//! releases what that stack does not need: the user address space and the
//! bookkeeping for its children. Destruction frees the kernel stack and the
//! control block and is always done by some other, live process.

use super::pcb::ProcessState;
use crate::{Kernel, PidAllocator, ProgramLoader};
use kernel_machine::Machine;
use kernel_sync::Pid;
use log::{debug, info};

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Records `status`, frees the user memory of `pid`, orphans its live
    /// children and destroys its uncollected ones.
    pub(crate) fn terminate(&mut self, pid: Pid, status: i64) {
        let Some(pcb) = self.procs.get_mut(pid) else {
            return;
        };
        pcb.state = ProcessState::Defunct { status };
        self.memory
            .vmm(&mut self.machine)
            .destroy_address_space(&mut pcb.space);
        let alive = core::mem::take(&mut pcb.alive);
        let defunct = core::mem::take(&mut pcb.defunct);

        for child in alive {
            if let Some(c) = self.procs.get_mut(child) {
                c.parent = None;
            }
        }
        for child in defunct {
            self.destroy(child);
        }
        info!("{pid:?} exited with status {status}");
    }

    /// Hands a terminated process to whoever will collect it: its parent's
    /// defunct list (waking the parent if it waits) or the orphan queue.
    pub(crate) fn bury(&mut self, pid: Pid) {
        let parent = self.procs.get(pid).and_then(|p| p.parent);
        match parent.and_then(|pp| self.procs.get_mut(pp)) {
            Some(pcb) => {
                pcb.alive.retain(|&c| c != pid);
                pcb.defunct.push_back(pid);
                let parent = pcb.pid();
                self.procs.wake_waiting(parent);
            }
            None => {
                debug!("{pid:?} orphaned");
                self.procs.orphans.push_back(pid);
            }
        }
    }

    /// Frees the kernel stack, any user memory left and the control block of
    /// `pid`, and retires the pid. Never called for the running process.
    pub(crate) fn destroy(&mut self, pid: Pid) {
        debug_assert_ne!(pid, self.procs.running, "destroying the running process");
        let Some(mut pcb) = self.procs.remove(pid) else {
            return;
        };
        let mut vmm = self.memory.vmm(&mut self.machine);
        vmm.destroy_address_space(&mut pcb.space);
        vmm.destroy_kernel_stack(&mut pcb.kstack);
        self.pids.retire_pid(pid);
        debug!("{pid:?} destroyed");
    }

    /// Destroys every process on the orphan queue.
    pub(crate) fn reap_orphans(&mut self) {
        while let Some(pid) = self.procs.orphans.pop_front() {
            self.destroy(pid);
        }
    }
}
