//! Checked access to the running process' memory.
//!
//! Every pointer a syscall receives is validated against the caller's
//! page table and protection before the kernel dereferences it. Copies
//! then go through [`VirtualMemory`], the same translation user code sees.

use crate::{Kernel, KernelError, PidAllocator, ProgramLoader};
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::PAGE_SIZE;
use kernel_machine::Machine;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::Pid;
use kernel_vmem::{Protection, VirtualMemory};

impl<M: Machine, L: ProgramLoader, P: PidAllocator> Kernel<M, L, P> {
    /// The translation in effect for the running process.
    pub(crate) fn user_memory(&mut self) -> VirtualMemory<'_, M> {
        VirtualMemory::new(
            &mut self.machine,
            self.memory.kernel.table(),
            Some(&self.procs.current().space),
        )
    }

    pub(crate) fn check_user_buffer(
        &self,
        addr: VirtualAddress,
        len: usize,
        prot: Protection,
    ) -> Result<(), KernelError> {
        self.procs
            .current()
            .space
            .check_buffer(addr, len as u64, prot)?;
        Ok(())
    }

    /// Checks an optional output word; null is accepted.
    pub(crate) fn check_out_ptr(&self, addr: VirtualAddress) -> Result<(), KernelError> {
        if addr.is_null() {
            return Ok(());
        }
        self.check_user_buffer(addr, 8, Protection::WRITE)
    }

    /// Copies `len` bytes in from the running process.
    pub(crate) fn copy_from_user(
        &mut self,
        addr: VirtualAddress,
        len: usize,
    ) -> Result<Vec<u8>, KernelError> {
        self.check_user_buffer(addr, len, Protection::READ)?;
        let mut data = vec![0u8; len];
        self.user_memory().read(addr, &mut data)?;
        Ok(data)
    }

    /// Copies `data` out to the running process.
    pub(crate) fn copy_to_user(
        &mut self,
        addr: VirtualAddress,
        data: &[u8],
    ) -> Result<(), KernelError> {
        self.check_user_buffer(addr, data.len(), Protection::WRITE)?;
        self.user_memory().write(addr, data)?;
        Ok(())
    }

    /// Stores a word through an optional output pointer; null skips it.
    pub(crate) fn put_user_word(
        &mut self,
        addr: VirtualAddress,
        value: u64,
    ) -> Result<(), KernelError> {
        if addr.is_null() {
            return Ok(());
        }
        self.copy_to_user(addr, &value.to_le_bytes())
    }

    /// Reads memory as the running process sees it, ignoring protection.
    ///
    /// # Errors
    /// [`KernelError::InvalidAddress`] for an unmapped byte.
    pub fn read_user(&mut self, addr: VirtualAddress, buf: &mut [u8]) -> Result<(), KernelError> {
        self.user_memory().read(addr, buf)?;
        Ok(())
    }

    /// Writes memory as the running process sees it, ignoring protection.
    ///
    /// # Errors
    /// [`KernelError::InvalidAddress`] for an unmapped byte.
    pub fn write_user(&mut self, addr: VirtualAddress, data: &[u8]) -> Result<(), KernelError> {
        self.user_memory().write(addr, data)?;
        Ok(())
    }

    /// Reads the memory of any process by walking its page table, without
    /// going through the TLB.
    ///
    /// # Errors
    /// [`KernelError::InvalidAddress`] if `pid` is unknown or a byte is not
    /// mapped in its address space.
    pub fn read_process_memory(
        &self,
        pid: Pid,
        addr: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), KernelError> {
        let pcb = self.procs.get(pid).ok_or(KernelError::InvalidAddress(addr))?;
        let mut done = 0usize;
        while done < buf.len() {
            let at = addr
                .checked_add(done as u64)
                .ok_or(KernelError::InvalidAddress(addr))?;
            let entry = pcb
                .space
                .table()
                .entry(at.page())
                .filter(kernel_vmem::PageEntry::valid)
                .ok_or(KernelError::InvalidAddress(at))?;
            let in_page = usize::try_from(PAGE_SIZE - at.offset()).unwrap_or(usize::MAX);
            let chunk = in_page.min(buf.len() - done);
            self.machine
                .phys_read(entry.frame().join(at.offset()), &mut buf[done..done + chunk])
                .map_err(|_| KernelError::InvalidAddress(at))?;
            done += chunk;
        }
        Ok(())
    }
}
