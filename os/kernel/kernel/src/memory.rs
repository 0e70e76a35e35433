use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::vmm::Vmm;
use kernel_machine::Machine;
use kernel_vmem::KernelPageTable;

/// The kernel's page table and the frame pool, the two things every
/// address-space edit needs besides the machine.
#[derive(Debug)]
pub(crate) struct Memory {
    pub(crate) kernel: KernelPageTable,
    pub(crate) frames: BitmapFrameAlloc,
}

impl Memory {
    pub(crate) const fn vmm<'a, M: Machine>(
        &'a mut self,
        machine: &'a mut M,
    ) -> Vmm<'a, M, BitmapFrameAlloc> {
        Vmm::new(machine, &mut self.kernel, &mut self.frames)
    }
}
