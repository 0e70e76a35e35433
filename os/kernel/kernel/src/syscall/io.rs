//! Terminal reads and writes.

use super::{Flow, count_value, length};
use crate::process::PendingCall;
use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use alloc::vec;
use alloc::vec::Vec;
use core::task::Poll;
use kernel_info::memory::NUM_TERMINALS;
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::Protection;

fn terminal(tty: u64) -> Result<usize, KernelError> {
    usize::try_from(tty)
        .ok()
        .filter(|&t| t < NUM_TERMINALS)
        .ok_or(KernelError::InvalidArgument)
}

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    pub(super) fn sys_tty_read(
        &mut self,
        tty: u64,
        buf: VirtualAddress,
        len: i64,
    ) -> Result<Flow, KernelError> {
        let tty = terminal(tty)?;
        let len = length(len)?;
        if len == 0 {
            return Ok(Flow::Return(0));
        }
        self.check_user_buffer(buf, len, Protection::WRITE)?;
        self.tty_read(tty, buf, len)
    }

    pub(super) fn tty_read(
        &mut self,
        tty: usize,
        buf: VirtualAddress,
        len: usize,
    ) -> Result<Flow, KernelError> {
        let mut line = vec![0u8; len];
        match self.ttys.read(tty, &mut self.procs, &mut line)? {
            Poll::Ready(n) => {
                self.copy_to_user(buf, &line[..n])?;
                Ok(Flow::Return(count_value(n)))
            }
            Poll::Pending => Ok(Flow::block(PendingCall::TtyRead { tty, buf, len })),
        }
    }

    pub(super) fn sys_tty_write(
        &mut self,
        tty: u64,
        buf: VirtualAddress,
        len: i64,
    ) -> Result<Flow, KernelError> {
        let tty = terminal(tty)?;
        let len = length(len)?;
        if len == 0 {
            return Ok(Flow::Return(0));
        }
        let data = self.copy_from_user(buf, len)?;
        self.tty_write(tty, data, 0)
    }

    pub(super) fn tty_write(
        &mut self,
        tty: usize,
        data: Vec<u8>,
        mut sent: usize,
    ) -> Result<Flow, KernelError> {
        match self
            .ttys
            .write(tty, &mut self.machine, &mut self.procs, &data, &mut sent)?
        {
            Poll::Ready(n) => Ok(Flow::Return(count_value(n))),
            Poll::Pending => Ok(Flow::block(PendingCall::TtyWrite { tty, data, sent })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_ids_are_bounded() {
        assert_eq!(terminal(0), Ok(0));
        assert_eq!(terminal(NUM_TERMINALS as u64 - 1), Ok(NUM_TERMINALS - 1));
        assert_eq!(terminal(NUM_TERMINALS as u64), Err(KernelError::InvalidArgument));
        assert_eq!(terminal(u64::MAX), Err(KernelError::InvalidArgument));
    }
}
