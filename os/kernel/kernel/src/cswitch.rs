//! Kernel context switching.
//!
//! Each process owns the frames of its kernel stack; the kernel stack
//! window in region 0 shows exactly one of them at a time. Switching
//! remaps the window (and the user region, when the address space
//! changes) and hands back the continuation the incoming process left
//! behind. Duplicating copies the window's contents into a new process'
//! frames so that, once dispatched, the copy resumes from the same point.

use crate::process::{KernelContext, Pcb, ProcessState};
use crate::{Kernel, PidAllocator, ProgramLoader};
use kernel_alloc::vmm::VmmError;
use kernel_machine::{Machine, Register, TlbFlush};
use kernel_sync::Pid;
use log::{trace, warn};

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Stores `saved` as the running process' continuation, makes `to` the
    /// running process and returns its continuation.
    pub(crate) fn switch(&mut self, saved: KernelContext, to: Pid) -> KernelContext {
        let from = self.procs.running;
        if let Some(pcb) = self.procs.get_mut(from) {
            pcb.kernel = saved;
        }

        let Some(next) = self.procs.get_mut(to) else {
            warn!("Cannot switch to unknown {to:?}");
            return KernelContext::Exited;
        };
        self.memory.kernel.install_kernel_stack(&next.kstack);
        self.machine.flush_tlb(TlbFlush::KernelStack);
        if from != to {
            self.machine.write_register(Register::Ptbr1, to.as_u64());
            self.machine.flush_tlb(TlbFlush::Region1);
        }
        next.state = ProcessState::Running;
        let resume = core::mem::take(&mut next.kernel);

        self.procs.running = to;
        trace!("switch {from:?} -> {to:?}");
        resume
    }

    /// Gives `child` a copy of the running kernel stack and `saved` as its
    /// continuation. The caller carries on with `saved` unaffected.
    ///
    /// # Errors
    /// [`VmmError::OutOfMemory`] if the stack frames cannot be allocated.
    pub(crate) fn duplicate(
        &mut self,
        saved: &KernelContext,
        child: &mut Pcb,
    ) -> Result<(), VmmError> {
        child.kstack = self.memory.vmm(&mut self.machine).copy_kernel_stack()?;
        child.kernel = saved.clone();
        Ok(())
    }
}
