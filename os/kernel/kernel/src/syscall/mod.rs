//! Syscall entry points.
//!
//! Each handler returns a [`Flow`] telling the trap loop what happens next.
//! A handler that has to wait returns [`Flow::block`] with a
//! [`PendingCall`]; when the process runs again the trap loop calls
//! [`Kernel::resume_syscall`], which re-enters the same handler with the
//! progress recorded so far.

mod io;
mod ipc;
mod memory;
mod process;

use crate::process::{KernelContext, PendingCall};
use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use kernel_machine::{Machine, UserContext};
use kernel_sync::{CvarWait, Handle, Pid};
use kernel_syscall::Syscall;
use log::{debug, warn};

/// What the trap loop does once a handler returns.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Write the value to the return register and resume the same process.
    Return(i64),
    /// Resume the running process with its registers as they are.
    Resume,
    /// Save this continuation and dispatch the next ready process.
    Switch(KernelContext),
    Halt,
}

impl Flow {
    pub(crate) const fn block(call: PendingCall) -> Self {
        Self::Switch(KernelContext::Syscall(call))
    }
}

/// A pid as a return value.
#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn pid_value(pid: Pid) -> i64 {
    pid.as_u64() as i64
}

/// A byte count as a return value.
#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn count_value(n: usize) -> i64 {
    n as i64
}

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Decodes and runs the syscall in `ctx` on behalf of the running process.
    pub(crate) fn syscall(&mut self, ctx: &UserContext) -> Flow {
        let call = match Syscall::decode(ctx) {
            Ok(call) => call,
            Err(e) => return self.refuse(e.into()),
        };
        debug!("{:?}: {call:?}", self.procs.running);

        let result = match call {
            Syscall::Fork => self.sys_fork(),
            Syscall::Exec { file, argv } => self.sys_exec(file, argv),
            Syscall::Exit { status } => Ok(self.exit_running(status)),
            Syscall::Wait { status } => self.sys_wait(status),
            Syscall::GetPid => Ok(Flow::Return(pid_value(self.procs.running))),
            Syscall::Brk { addr } => self.sys_brk(addr),
            Syscall::Delay { ticks } => self.sys_delay(ticks),
            Syscall::TtyRead { tty, buf, len } => self.sys_tty_read(tty, buf, len),
            Syscall::TtyWrite { tty, buf, len } => self.sys_tty_write(tty, buf, len),
            Syscall::PipeInit { id_out } => self.sys_pipe_init(id_out),
            Syscall::PipeRead { pipe, buf, len } => self.sys_pipe_read(Handle::new(pipe), buf, len),
            Syscall::PipeWrite { pipe, buf, len } => {
                self.sys_pipe_write(Handle::new(pipe), buf, len)
            }
            Syscall::LockInit { id_out } => self.sys_lock_init(id_out),
            Syscall::LockAcquire { lock } => self.lock_acquire(Handle::new(lock), false),
            Syscall::LockRelease { lock } => self.sys_lock_release(Handle::new(lock)),
            Syscall::CvarInit { id_out } => self.sys_cvar_init(id_out),
            Syscall::CvarSignal { cvar } => self.sys_cvar_signal(Handle::new(cvar)),
            Syscall::CvarBroadcast { cvar } => self.sys_cvar_broadcast(Handle::new(cvar)),
            Syscall::CvarWait { cvar, lock } => {
                self.cvar_wait(Handle::new(cvar), Handle::new(lock), CvarWait::default())
            }
            Syscall::Reclaim { id } => self.sys_reclaim(Handle::new(id)),
        };
        result.unwrap_or_else(|e| self.refuse(e))
    }

    /// Re-enters a syscall the running process blocked in.
    pub(crate) fn resume_syscall(&mut self, call: PendingCall) -> Flow {
        let result = match call {
            PendingCall::Fork { child } => Ok(Flow::Return(if self.procs.running == child {
                0
            } else {
                pid_value(child)
            })),
            PendingCall::Wait { status } => self.sys_wait(status),
            PendingCall::Delay => Ok(Flow::Return(0)),
            PendingCall::TtyRead { tty, buf, len } => self.tty_read(tty, buf, len),
            PendingCall::TtyWrite { tty, data, sent } => self.tty_write(tty, data, sent),
            PendingCall::PipeRead { pipe, buf, len } => self.pipe_read(pipe, buf, len, true),
            PendingCall::PipeWrite { pipe, data, done } => self.pipe_write(pipe, data, done, true),
            PendingCall::LockAcquire { lock } => self.lock_acquire(lock, true),
            PendingCall::CvarWait { cvar, lock, stage } => self.cvar_wait(cvar, lock, stage),
        };
        result.unwrap_or_else(|e| self.refuse(e))
    }

    fn refuse(&self, e: KernelError) -> Flow {
        warn!("{:?}: syscall failed: {e}", self.procs.running);
        Flow::Return(e.return_code())
    }
}

/// A user length as a byte count.
pub(crate) fn length(len: i64) -> Result<usize, KernelError> {
    usize::try_from(len).map_err(|_| KernelError::InvalidArgument)
}
