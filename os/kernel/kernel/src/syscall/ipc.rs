//! Pipes, locks, condition variables and reclaiming them.

use super::{Flow, count_value, length};
use crate::process::PendingCall;
use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use alloc::vec;
use alloc::vec::Vec;
use core::task::Poll;
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{CvarWait, Handle, SyncObjects};
use kernel_vmem::Protection;
use log::debug;

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// Creates an object with `create` and reports its handle through
    /// `id_out`, which is checked first so a bad pointer creates nothing.
    fn init_object(
        &mut self,
        id_out: VirtualAddress,
        create: fn(&mut SyncObjects) -> Handle,
    ) -> Result<Flow, KernelError> {
        self.check_out_ptr(id_out)?;
        let handle = create(&mut self.objects);
        debug!("{:?} created {handle}", self.procs.running);
        self.put_user_word(id_out, handle.as_u64())?;
        Ok(Flow::Return(0))
    }

    pub(super) fn sys_pipe_init(&mut self, id_out: VirtualAddress) -> Result<Flow, KernelError> {
        self.init_object(id_out, SyncObjects::new_pipe)
    }

    pub(super) fn sys_lock_init(&mut self, id_out: VirtualAddress) -> Result<Flow, KernelError> {
        self.init_object(id_out, SyncObjects::new_lock)
    }

    pub(super) fn sys_cvar_init(&mut self, id_out: VirtualAddress) -> Result<Flow, KernelError> {
        self.init_object(id_out, SyncObjects::new_cvar)
    }

    pub(super) fn sys_pipe_read(
        &mut self,
        pipe: Handle,
        buf: VirtualAddress,
        len: i64,
    ) -> Result<Flow, KernelError> {
        let len = length(len)?;
        self.objects
            .pipe(pipe)
            .ok_or(KernelError::HandleNotFound(pipe))?;
        if len == 0 {
            return Ok(Flow::Return(0));
        }
        self.check_user_buffer(buf, len, Protection::WRITE)?;
        self.pipe_read(pipe, buf, len, false)
    }

    pub(super) fn pipe_read(
        &mut self,
        pipe: Handle,
        buf: VirtualAddress,
        len: usize,
        resumed: bool,
    ) -> Result<Flow, KernelError> {
        let mut bytes = vec![0u8; len];
        match self
            .objects
            .pipe_mut(pipe)?
            .read(&mut self.procs, &mut bytes, resumed)
        {
            Poll::Ready(n) => {
                self.copy_to_user(buf, &bytes[..n])?;
                Ok(Flow::Return(count_value(n)))
            }
            Poll::Pending => Ok(Flow::block(PendingCall::PipeRead { pipe, buf, len })),
        }
    }

    pub(super) fn sys_pipe_write(
        &mut self,
        pipe: Handle,
        buf: VirtualAddress,
        len: i64,
    ) -> Result<Flow, KernelError> {
        let len = length(len)?;
        self.objects
            .pipe(pipe)
            .ok_or(KernelError::HandleNotFound(pipe))?;
        if len == 0 {
            return Ok(Flow::Return(0));
        }
        let data = self.copy_from_user(buf, len)?;
        self.pipe_write(pipe, data, 0, false)
    }

    pub(super) fn pipe_write(
        &mut self,
        pipe: Handle,
        data: Vec<u8>,
        mut done: usize,
        resumed: bool,
    ) -> Result<Flow, KernelError> {
        match self
            .objects
            .pipe_mut(pipe)?
            .write(&mut self.procs, &data, &mut done, resumed)
        {
            Poll::Ready(n) => Ok(Flow::Return(count_value(n))),
            Poll::Pending => Ok(Flow::block(PendingCall::PipeWrite { pipe, data, done })),
        }
    }

    pub(super) fn lock_acquire(&mut self, lock: Handle, resumed: bool) -> Result<Flow, KernelError> {
        match self.objects.lock_mut(lock)?.acquire(&mut self.procs, resumed) {
            Poll::Ready(()) => Ok(Flow::Return(0)),
            Poll::Pending => Ok(Flow::block(PendingCall::LockAcquire { lock })),
        }
    }

    pub(super) fn sys_lock_release(&mut self, lock: Handle) -> Result<Flow, KernelError> {
        self.objects.lock_mut(lock)?.release(&mut self.procs)?;
        Ok(Flow::Return(0))
    }

    pub(super) fn cvar_wait(
        &mut self,
        cvar: Handle,
        lock: Handle,
        mut stage: CvarWait,
    ) -> Result<Flow, KernelError> {
        // Once asleep the waiter only needs the lock; the condition
        // variable may be reclaimed after signalling.
        let poll = if stage == CvarWait::Release {
            let (c, l) = self.objects.cvar_and_lock_mut(cvar, lock)?;
            c.wait(l, &mut self.procs, &mut stage)
        } else {
            self.objects
                .lock_mut(lock)?
                .finish_cvar_wait(&mut self.procs, &mut stage)
                .map(Ok)
        };
        match poll {
            Poll::Ready(result) => {
                result?;
                Ok(Flow::Return(0))
            }
            Poll::Pending => Ok(Flow::block(PendingCall::CvarWait { cvar, lock, stage })),
        }
    }

    pub(super) fn sys_cvar_signal(&mut self, cvar: Handle) -> Result<Flow, KernelError> {
        self.objects.cvar_mut(cvar)?.signal(&mut self.procs);
        Ok(Flow::Return(0))
    }

    pub(super) fn sys_cvar_broadcast(&mut self, cvar: Handle) -> Result<Flow, KernelError> {
        self.objects.cvar_mut(cvar)?.broadcast(&mut self.procs);
        Ok(Flow::Return(0))
    }

    pub(super) fn sys_reclaim(&mut self, id: Handle) -> Result<Flow, KernelError> {
        let kind = self.objects.reclaim(id)?;
        debug!("{:?} reclaimed {kind:?} {id}", self.procs.running);
        Ok(Flow::Return(0))
    }
}
