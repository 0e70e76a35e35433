use super::Flow;
use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Moves the running process' heap boundary to `addr`.
    pub(super) fn sys_brk(&mut self, addr: VirtualAddress) -> Result<Flow, KernelError> {
        let space = &mut self.procs.current_mut().space;
        self.memory
            .vmm(&mut self.machine)
            .set_break(space, addr)?;
        Ok(Flow::Return(0))
    }
}
