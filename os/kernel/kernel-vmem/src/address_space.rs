//! # User Address Space
//!
//! A process' region 1 page table plus the bounds that partition it:
//!
//! ```text
//! REGION1_BASE                                               REGION1_LIMIT
//! |  text / data / bss  |  heap  ->     (unmapped)     <- stack |
//!                       ^        ^                     ^
//!                    data_end   brk                stack_low
//! ```
//!
//! The heap grows from `data_end` up to `brk`; the stack grows down from the
//! region top to `stack_low`. The memory manager keeps at least one unmapped
//! page between the two.

use crate::page_entry_bits::Protection;
use crate::page_table::UserPageTable;
use crate::AccessError;
use kernel_info::memory::{REGION1_BASE, REGION1_LIMIT, Region};
use kernel_memory_addresses::{VirtualAddress, VirtualPage};

#[derive(Debug, Clone)]
pub struct UserAddressSpace {
    table: UserPageTable,
    data_end: VirtualAddress,
    brk: VirtualAddress,
    stack_low: VirtualAddress,
}

impl Default for UserAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAddressSpace {
    /// An address space with nothing mapped, no data, and an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: UserPageTable::user(),
            data_end: VirtualAddress::new(REGION1_BASE),
            brk: VirtualAddress::new(REGION1_BASE),
            stack_low: VirtualAddress::new(REGION1_LIMIT),
        }
    }

    #[inline]
    #[must_use]
    pub const fn table(&self) -> &UserPageTable {
        &self.table
    }

    #[inline]
    pub const fn table_mut(&mut self) -> &mut UserPageTable {
        &mut self.table
    }

    /// End of the loaded program's static data; the heap may not shrink below it.
    #[inline]
    #[must_use]
    pub const fn data_end(&self) -> VirtualAddress {
        self.data_end
    }

    #[inline]
    #[must_use]
    pub const fn brk(&self) -> VirtualAddress {
        self.brk
    }

    /// Lowest mapped stack address (page aligned).
    #[inline]
    #[must_use]
    pub const fn stack_low(&self) -> VirtualAddress {
        self.stack_low
    }

    #[inline]
    pub const fn set_data_end(&mut self, data_end: VirtualAddress) {
        self.data_end = data_end;
    }

    #[inline]
    pub const fn set_brk(&mut self, brk: VirtualAddress) {
        self.brk = brk;
    }

    #[inline]
    pub const fn set_stack_low(&mut self, stack_low: VirtualAddress) {
        self.stack_low = stack_low;
    }

    /// Copies the heap and stack bounds of `other`.
    pub const fn copy_bounds_from(&mut self, other: &Self) {
        self.data_end = other.data_end;
        self.brk = other.brk;
        self.stack_low = other.stack_low;
    }

    /// Number of mapped frames.
    #[must_use]
    pub fn size(&self) -> usize {
        self.table.valid_count()
    }

    /// Checks that user code may access `addr` with `prot`.
    ///
    /// # Errors
    /// * [`AccessError::OutOfRegion`] if `addr` is not in region 1.
    /// * [`AccessError::Unmapped`] if its page is not mapped.
    /// * [`AccessError::Protection`] if the mapping lacks a right in `prot`.
    pub fn check_address(&self, addr: VirtualAddress, prot: Protection) -> Result<(), AccessError> {
        self.check_page(addr.page(), addr, prot)
    }

    /// Checks every page touched by `len` bytes starting at `addr`. An empty
    /// buffer is accepted without looking at `addr`.
    ///
    /// # Errors
    /// As [`check_address`](Self::check_address), for the first failing page.
    pub fn check_buffer(
        &self,
        addr: VirtualAddress,
        len: u64,
        prot: Protection,
    ) -> Result<(), AccessError> {
        if len == 0 {
            return Ok(());
        }
        let last = addr
            .checked_add(len - 1)
            .ok_or(AccessError::OutOfRegion(addr))?;
        let mut page = addr.page();
        loop {
            let at = if page == addr.page() { addr } else { page.base() };
            self.check_page(page, at, prot)?;
            if page == last.page() {
                return Ok(());
            }
            page = page.next();
        }
    }

    fn check_page(
        &self,
        page: VirtualPage,
        addr: VirtualAddress,
        prot: Protection,
    ) -> Result<(), AccessError> {
        if Region::of(addr) != Some(Region::User) {
            return Err(AccessError::OutOfRegion(addr));
        }
        let entry = self
            .table
            .entry(page)
            .filter(|e| e.valid())
            .ok_or(AccessError::Unmapped(addr))?;
        if !entry.protection().contains(prot) {
            return Err(AccessError::Protection {
                addr,
                required: prot,
            });
        }
        Ok(())
    }
}
