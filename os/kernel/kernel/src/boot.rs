//! Bringing the machine up.
//!
//! ```text
//!  physical memory ──► frame pool
//!  kernel text      ──► identity, read+execute
//!  data .. brk      ──► identity, read+write
//!  stack window     ──► identity, owned by init
//!  VM on ──► init loaded ──► idle created ──► first return to user mode
//! ```

use crate::loader::{ImageBuilder, LoadFailure};
use crate::memory::Memory;
use crate::process::{KernelContext, Pcb, ProcessState, ProcessTable};
use crate::{Kernel, PidAllocator, ProgramLoader};
use alloc::vec::Vec;
use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError, FrameRequest};
use kernel_alloc::vmm::VmmError;
use kernel_info::boot::{BootConfig, BootConfigError};
use kernel_info::memory::{
    KERNEL_STACK_BASE, KERNEL_STACK_LIMIT, PAGE_SIZE, REGION0_PAGES, REGION1_LIMIT, REGION1_PAGES,
};
use kernel_machine::{Machine, Register, TlbFlush};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress, VirtualPage};
use kernel_sync::{Pid, SyncObjects, Terminals};
use kernel_vmem::{KernelPageTable, Protection};
use log::info;

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] BootConfigError),
    #[error("machine has {installed:#x} bytes of memory, configuration expects {configured:#x}")]
    MissingMemory { installed: u64, configured: u64 },
    #[error(transparent)]
    Frames(#[from] FrameAllocError),
    #[error(transparent)]
    Memory(#[from] VmmError),
    #[error("cannot load init: {0}")]
    Init(LoadFailure),
}

impl Memory {
    /// Maps `[from, to)` onto the frames with the same numbers.
    fn identity_map(&mut self, from: u64, to: u64, prot: Protection) -> Result<(), BootError> {
        for number in from / PAGE_SIZE..to.div_ceil(PAGE_SIZE) {
            let frame = self
                .frames
                .allocate(FrameRequest::Fixed(PhysicalPage::from_number(number)))?;
            self.kernel
                .table_mut()
                .map(VirtualPage::from_number(number), frame, prot)
                .map_err(VmmError::from)?;
        }
        Ok(())
    }
}

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Initializes memory, creates init and idle, and leaves the machine's
    /// user context set up to enter init.
    ///
    /// # Errors
    /// [`BootError`] if the configuration is inconsistent with itself or the
    /// machine, or init cannot be loaded.
    pub fn boot(mut machine: M, config: &BootConfig, loader: L, mut pids: P) -> Result<Self, BootError> {
        #[cfg(feature = "trace")]
        if let Some(level) = config.log_level
            && kernel_trace::TraceLogger::new(level).init().is_err()
        {
            log::debug!("logger already installed");
        }

        config.validate()?;
        if machine.pmem_size() < config.pmem_size {
            return Err(BootError::MissingMemory {
                installed: machine.pmem_size(),
                configured: config.pmem_size,
            });
        }

        let frames = usize::try_from(config.frame_count()).unwrap_or(usize::MAX);
        let mut memory = Memory {
            kernel: KernelPageTable::new(config.kernel_data_start, config.kernel_brk),
            frames: BitmapFrameAlloc::new(frames),
        };
        let data = config.kernel_data_start.align_down().as_u64();
        memory.identity_map(0, data, Protection::READ_EXEC)?;
        memory.identity_map(data, config.kernel_brk.as_u64(), Protection::READ_WRITE)?;
        memory.identity_map(KERNEL_STACK_BASE, KERNEL_STACK_LIMIT, Protection::READ_WRITE)?;

        machine.write_register(Register::Ptbr0, 0);
        machine.write_register(Register::Ptlr0, REGION0_PAGES as u64);
        machine.write_register(Register::Ptlr1, REGION1_PAGES as u64);
        machine.write_register(Register::VmEnable, 1);
        machine.flush_tlb(TlbFlush::All);
        info!(
            "virtual memory enabled, {} of {frames} frames free",
            memory.frames.available()
        );

        let init = pids.new_pid();
        let idle = pids.new_pid();
        let mut first = Pcb::new(init, None);
        first.kstack = memory.kernel.kernel_stack();
        machine.write_register(Register::Ptbr1, init.as_u64());

        let mut kernel = Self {
            machine,
            memory,
            procs: ProcessTable::new(first, idle),
            objects: SyncObjects::new(),
            ttys: Terminals::new(),
            loader,
            pids,
            init,
            halted: false,
        };
        kernel.load_init(config)?;
        kernel.spawn_idle(idle, config.idle_pc)?;

        *kernel.machine.user_context_mut() = kernel.procs.current().user.clone();
        info!(
            "booted: init {init:?}, idle {idle:?}, {} frames free",
            kernel.free_frames()
        );
        Ok(kernel)
    }

    fn load_init(&mut self, config: &BootConfig) -> Result<(), BootError> {
        let args: Vec<Vec<u8>> = config
            .init_args
            .iter()
            .map(|a| a.as_bytes().to_vec())
            .collect();
        let pcb = self.procs.current_mut();
        let mut image =
            ImageBuilder::new(&mut self.machine, &mut self.memory, &mut pcb.space, &mut pcb.user);
        self.loader
            .load(config.init_program.as_bytes(), &args, &mut image)
            .map_err(BootError::Init)
    }

    /// Creates the idle process: one stack page at the top of region 1,
    /// entry at `pc`, and a copy of the boot kernel stack.
    fn spawn_idle(&mut self, pid: Pid, pc: VirtualAddress) -> Result<(), BootError> {
        let mut idle = Pcb::new(pid, None);
        let top = VirtualAddress::new(REGION1_LIMIT - PAGE_SIZE);
        self.memory
            .vmm(&mut self.machine)
            .map_user_page(&mut idle.space, top.page(), Protection::READ_WRITE)?;
        idle.space.set_stack_low(top);
        idle.user.pc = pc;
        idle.user.sp = VirtualAddress::new(REGION1_LIMIT - 8);

        if let Err(e) = self.duplicate(&KernelContext::User, &mut idle) {
            self.memory
                .vmm(&mut self.machine)
                .destroy_address_space(&mut idle.space);
            return Err(e.into());
        }
        idle.state = ProcessState::Ready;
        self.procs.insert(idle);
        Ok(())
    }
}
