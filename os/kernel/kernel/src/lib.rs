//! # The Kernel
//!
//! A single-CPU preemptible kernel for the simulated machine in
//! [`kernel_machine`]. One [`Kernel`] value owns everything: the machine,
//! the frame pool and kernel page table, the process table, the
//! synchronization objects and the terminal queues.
//!
//! ## Control flow
//!
//! The machine delivers every event as a trap. [`Kernel::handle_trap`] saves
//! the trapping process' registers, acts on the trap and returns once some
//! process is ready to continue in user mode, with that process' registers
//! loaded back into the machine.
//!
//! A syscall that has to wait does not hold a kernel stack hostage. It
//! records a [`PendingCall`] describing how far it got, the process is
//! switched out, and the trap loop resumes whatever the next process was
//! doing. When the blocked process is dispatched again its pending call is
//! simply re-entered:
//!
//! ```text
//!   trap ──► dispatch ──► Return / Resume ─────────────► user mode
//!                 │
//!                 └─► Block(pending) ──► switch(next) ──► resume next's
//!                                            ▲            continuation
//!                                            └──── blocks again ◄┘
//! ```
//!
//! ## Example
//! ```
//! use kernel::{Kernel, ProgramCatalog, Program, SequentialPidAllocator, TrapExit};
//! use kernel_info::boot::BootConfig;
//! use kernel_machine::{Machine, SimulatedMachine, TrapVector};
//! use kernel_syscall::Syscall;
//!
//! let config = BootConfig::default();
//! let machine = SimulatedMachine::new(config.pmem_size);
//! let programs = ProgramCatalog::new().with("init", Program::new(vec![0; 64]));
//! let mut kernel = Kernel::boot(machine, &config, programs, SequentialPidAllocator::new()).unwrap();
//!
//! Syscall::GetPid.encode_into(kernel.machine_mut().user_context_mut());
//! assert!(matches!(kernel.handle_trap(), TrapExit::User(_)));
//! assert_eq!(kernel.machine().user_context().return_value(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod boot;
mod cswitch;
mod error;
mod loader;
mod memory;
mod pid;
mod process;
mod scheduler;
mod syscall;
mod trap;
mod uaccess;

pub use boot::BootError;
pub use error::KernelError;
pub use kernel_sync::{Handle, Pid};
pub use loader::{ImageBuilder, LoadError, LoadFailure, Program, ProgramCatalog, ProgramLoader};
pub use pid::{PidAllocator, SequentialPidAllocator};
pub use process::{KernelContext, Pcb, PendingCall, ProcessState, ProcessTable};
pub use trap::{Trap, TrapExit};

use crate::memory::Memory;
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{SyncObjects, Terminals};
use kernel_vmem::KernelPageTable;

/// All kernel state.
pub struct Kernel<M: Machine, L: ProgramLoader, P: PidAllocator = SequentialPidAllocator> {
    machine: M,
    memory: Memory,
    procs: ProcessTable,
    objects: SyncObjects,
    ttys: Terminals,
    loader: L,
    pids: P,
    init: Pid,
    halted: bool,
}

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    #[must_use]
    pub const fn machine(&self) -> &M {
        &self.machine
    }

    pub const fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    #[must_use]
    pub const fn processes(&self) -> &ProcessTable {
        &self.procs
    }

    #[must_use]
    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.procs.get(pid)
    }

    /// The process that will run when the current trap returns.
    #[must_use]
    pub const fn running(&self) -> Pid {
        self.procs.running
    }

    /// The root process; its exit halts the machine.
    #[must_use]
    pub const fn init_pid(&self) -> Pid {
        self.init
    }

    #[must_use]
    pub const fn idle_pid(&self) -> Pid {
        self.procs.idle
    }

    #[must_use]
    pub const fn frames(&self) -> &BitmapFrameAlloc {
        &self.memory.frames
    }

    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.memory.frames.available()
    }

    #[must_use]
    pub const fn kernel_page_table(&self) -> &KernelPageTable {
        &self.memory.kernel
    }

    #[must_use]
    pub const fn objects(&self) -> &SyncObjects {
        &self.objects
    }

    #[must_use]
    pub const fn terminals(&self) -> &Terminals {
        &self.ttys
    }

    /// Whether the machine has been halted. No further traps are handled.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Moves the kernel heap boundary, for the kernel's own allocator.
    ///
    /// # Errors
    /// [`KernelError::InvalidAddress`] below the kernel data or into the
    /// scratch page; [`KernelError::OutOfMemory`] with nothing allocated.
    pub fn set_kernel_brk(&mut self, brk: VirtualAddress) -> Result<(), KernelError> {
        self.memory.vmm(&mut self.machine).set_kernel_brk(brk)?;
        Ok(())
    }

    fn halt(&mut self) {
        if !self.halted {
            self.halted = true;
            self.machine.halt();
        }
    }
}
