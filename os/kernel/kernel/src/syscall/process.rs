use super::{Flow, pid_value};
use crate::loader::{ImageBuilder, LoadFailure};
use crate::process::{KernelContext, Pcb, PendingCall, ProcessState};
use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use alloc::vec::Vec;
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;
use kernel_syscall::ERROR;
use log::{error, info, warn};

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Creates a copy of the running process. The parent gets the child's
    /// pid; the child, once dispatched, returns 0 from the same call.
    pub(super) fn sys_fork(&mut self) -> Result<Flow, KernelError> {
        let parent = self.procs.running;
        let mut child = Pcb::new(self.pids.new_pid(), Some(parent));
        let pid = child.pid();

        let src = self.procs.current();
        child.user = src.user.clone();
        if let Err(e) = self
            .memory
            .vmm(&mut self.machine)
            .copy_address_space(&src.space, &mut child.space)
        {
            self.pids.retire_pid(pid);
            return Err(e.into());
        }

        let saved = KernelContext::Syscall(PendingCall::Fork { child: pid });
        if let Err(e) = self.duplicate(&saved, &mut child) {
            self.memory
                .vmm(&mut self.machine)
                .destroy_address_space(&mut child.space);
            self.pids.retire_pid(pid);
            return Err(e.into());
        }

        child.state = ProcessState::Ready;
        self.procs.current_mut().alive.push(pid);
        self.procs.insert(child);
        self.procs.ready.push_back(pid);
        info!("{parent:?} forked {pid:?}");
        Ok(Flow::Return(pid_value(pid)))
    }

    /// Replaces the running program. On success the new image's registers
    /// are already in place and nothing is returned.
    pub(super) fn sys_exec(
        &mut self,
        file: VirtualAddress,
        argv: VirtualAddress,
    ) -> Result<Flow, KernelError> {
        let mut vm = self.user_memory();
        let name = vm.check_string(file)?;
        let args = if argv.is_null() {
            Vec::new()
        } else {
            vm.check_args(argv)?
        };

        let pid = self.procs.running;
        let pcb = self.procs.current_mut();
        let mut image =
            ImageBuilder::new(&mut self.machine, &mut self.memory, &mut pcb.space, &mut pcb.user);
        match self.loader.load(&name, &args, &mut image) {
            Ok(()) => {
                info!("{pid:?} exec {}", alloc::string::String::from_utf8_lossy(&name));
                Ok(Flow::Resume)
            }
            Err(LoadFailure::Error(e)) => Err(e.into()),
            Err(LoadFailure::Kill(e)) => {
                warn!("{pid:?}: exec lost the old image: {e}");
                Ok(self.exit_running(ERROR))
            }
        }
    }

    /// Ends the running process with `status`.
    ///
    /// The root process halts the machine instead; idle never exits.
    pub(crate) fn exit_running(&mut self, status: i64) -> Flow {
        let pid = self.procs.running;
        if pid == self.init {
            error!("init ({pid:?}) exited with status {status}, halting");
            return Flow::Halt;
        }
        if pid == self.procs.idle {
            error!("idle process died, halting");
            return Flow::Halt;
        }

        self.reap_orphans();
        self.terminate(pid, status);
        self.bury(pid);
        Flow::Switch(KernelContext::Exited)
    }

    /// Collects one terminated child, blocking until there is one.
    pub(super) fn sys_wait(&mut self, status: VirtualAddress) -> Result<Flow, KernelError> {
        self.check_out_ptr(status)?;
        let me = self.procs.current();
        if me.alive.is_empty() && me.defunct.is_empty() {
            return Err(KernelError::NoChildren);
        }

        self.reap_orphans();
        let Some(child) = self.procs.current_mut().defunct.pop_front() else {
            self.procs.block_waiting();
            return Ok(Flow::block(PendingCall::Wait { status }));
        };

        let code = self
            .procs
            .get(child)
            .and_then(Pcb::exit_status)
            .unwrap_or(ERROR);
        self.destroy(child);
        self.put_user_word(status, code.cast_unsigned())?;
        Ok(Flow::Return(pid_value(child)))
    }

    pub(super) fn sys_delay(&mut self, ticks: i64) -> Result<Flow, KernelError> {
        let ticks = u64::try_from(ticks).map_err(|_| KernelError::InvalidArgument)?;
        if ticks == 0 {
            return Ok(Flow::Return(0));
        }
        self.procs.delay_running(ticks);
        Ok(Flow::block(PendingCall::Delay))
    }
}
