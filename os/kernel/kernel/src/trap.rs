//! Trap entry.

use crate::process::KernelContext;
use crate::syscall::Flow;
use crate::{Kernel, PidAllocator, ProgramLoader};
use kernel_info::memory::{KERNEL_STACK_LIMIT, Region};
use kernel_machine::{Machine, MemoryFaultKind, TrapVector, UserContext};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::Pid;
use kernel_syscall::ERROR;
use log::{error, trace, warn};

/// Bytes of trap record kept at the top of the kernel stack window.
const TRAP_FRAME_BYTES: u64 = 3 * 8;

/// A trap as the kernel acts on it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Trap {
    /// Syscall.
    Kernel,
    Clock,
    Illegal,
    Memory {
        addr: VirtualAddress,
        kind: Option<MemoryFaultKind>,
    },
    Math,
    TtyReceive(usize),
    TtyTransmit(usize),
    Disk,
}

impl Trap {
    /// Classifies the trap the machine saved in `ctx`.
    #[must_use]
    pub fn from_context(ctx: &UserContext) -> Self {
        let tty = || usize::try_from(ctx.code).unwrap_or(usize::MAX);
        match ctx.vector {
            TrapVector::Kernel => Self::Kernel,
            TrapVector::Clock => Self::Clock,
            TrapVector::Illegal => Self::Illegal,
            TrapVector::Memory => Self::Memory {
                addr: ctx.addr,
                kind: MemoryFaultKind::from_code(ctx.code),
            },
            TrapVector::Math => Self::Math,
            TrapVector::TtyReceive => Self::TtyReceive(tty()),
            TrapVector::TtyTransmit => Self::TtyTransmit(tty()),
            TrapVector::Disk => Self::Disk,
        }
    }
}

/// How a trap ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapExit {
    /// Back to user mode in this process.
    User(Pid),
    /// The machine is halted.
    Halted,
}

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Handles the trap described by the machine's saved user context.
    ///
    /// On return the machine's user context belongs to the process that
    /// runs next, which may not be the one that trapped.
    pub fn handle_trap(&mut self) -> TrapExit {
        if self.halted {
            return TrapExit::Halted;
        }

        let ctx = self.machine.user_context().clone();
        self.procs.current_mut().user = ctx.clone();
        self.record_trap_frame(&ctx);

        let trap = Trap::from_context(&ctx);
        trace!("{:?}: {trap:?}", self.procs.running);
        let mut flow = self.dispatch(trap, &ctx);
        loop {
            match flow {
                Flow::Return(value) => {
                    self.procs.current_mut().user.set_return(value);
                    break;
                }
                Flow::Resume => break,
                Flow::Switch(saved) => {
                    let next = self.procs.pick_next();
                    flow = match self.switch(saved, next) {
                        KernelContext::User => Flow::Resume,
                        KernelContext::Syscall(call) => self.resume_syscall(call),
                        KernelContext::Exited => {
                            error!("{next:?} was dispatched after exiting");
                            Flow::Halt
                        }
                    };
                }
                Flow::Halt => {
                    self.halt();
                    return TrapExit::Halted;
                }
            }
        }

        let running = self.procs.current();
        *self.machine.user_context_mut() = running.user.clone();
        TrapExit::User(running.pid())
    }

    fn dispatch(&mut self, trap: Trap, ctx: &UserContext) -> Flow {
        match trap {
            Trap::Kernel => self.syscall(ctx),
            Trap::Clock => {
                if self.procs.preempt() {
                    Flow::Switch(KernelContext::User)
                } else {
                    Flow::Resume
                }
            }
            Trap::Memory { addr, kind } => self.memory_fault(addr, kind, ctx.sp),
            Trap::Illegal | Trap::Math => {
                warn!("{:?}: {trap:?} at {}", self.procs.running, ctx.pc);
                self.exit_running(ERROR)
            }
            Trap::TtyReceive(tty) => {
                if let Err(e) = self.ttys.receive(tty, &mut self.machine, &mut self.procs) {
                    warn!("Receive trap: {e}");
                }
                Flow::Resume
            }
            Trap::TtyTransmit(tty) => {
                if let Err(e) = self.ttys.transmit_complete(tty, &mut self.procs) {
                    warn!("Transmit trap: {e}");
                }
                Flow::Resume
            }
            Trap::Disk => {
                warn!("Ignoring disk trap");
                Flow::Resume
            }
        }
    }

    /// Grows the stack if `addr` is just below it, otherwise kills the
    /// running process.
    fn memory_fault(
        &mut self,
        addr: VirtualAddress,
        kind: Option<MemoryFaultKind>,
        sp: VirtualAddress,
    ) -> Flow {
        let pid = self.procs.running;
        let space = &mut self.procs.current_mut().space;
        let below_stack = Region::of(addr) == Some(Region::User)
            && addr >= sp.align_down()
            && addr < space.stack_low();

        if below_stack {
            match self.memory.vmm(&mut self.machine).grow_stack(space, addr) {
                Ok(()) => return Flow::Resume,
                Err(e) => warn!("{pid:?}: cannot grow stack to {addr}: {e}"),
            }
        }
        warn!("{pid:?}: unrecoverable {kind:?} fault at {addr}");
        self.exit_running(ERROR)
    }

    /// Writes the trap vector and user pc/sp to the top of the kernel stack
    /// window.
    fn record_trap_frame(&mut self, ctx: &UserContext) {
        if !self.machine.vm_enabled() {
            return;
        }
        let top = VirtualAddress::new(KERNEL_STACK_LIMIT - TRAP_FRAME_BYTES);
        let words = [ctx.vector as u64, ctx.pc.as_u64(), ctx.sp.as_u64()];
        let mut vm = self.user_memory();
        for (slot, word) in (0u64..).zip(words) {
            if let Err(e) = vm.write_u64(top + slot * 8, word) {
                warn!("Cannot record trap frame: {e}");
                return;
            }
        }
        trace!("trap frame {words:x?}");
    }
}
