//! # Software Translation
//!
//! The kernel reaches memory through virtual addresses just like user code
//! does. [`VirtualMemory`] performs the walk the MMU would: TLB first, then
//! the region's table, caching what it found.

use crate::address_space::UserAddressSpace;
use crate::page_entry_bits::{PageEntry, Protection};
use crate::page_table::PageTable;
use crate::AccessError;
use alloc::vec::Vec;
use kernel_info::memory::{MAX_CHECK, PAGE_SIZE, REGION0_PAGES, Region};
use kernel_machine::Machine;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// A view of the currently active translation: the kernel table plus the
/// user address space installed in region 1, if any.
pub struct VirtualMemory<'a, M: Machine> {
    machine: &'a mut M,
    kernel: &'a PageTable<REGION0_PAGES>,
    user: Option<&'a UserAddressSpace>,
}

impl<'a, M: Machine> VirtualMemory<'a, M> {
    pub const fn new(
        machine: &'a mut M,
        kernel: &'a PageTable<REGION0_PAGES>,
        user: Option<&'a UserAddressSpace>,
    ) -> Self {
        Self {
            machine,
            kernel,
            user,
        }
    }

    /// Translates `va` to a physical address.
    ///
    /// With translation disabled addresses are physical. Otherwise a cached
    /// entry wins over the table, so edits the caller has not flushed are
    /// not observed.
    ///
    /// # Errors
    /// [`AccessError::OutOfRegion`] above region 1 or in region 1 with no user
    /// space installed; [`AccessError::Unmapped`] for an invalid entry.
    pub fn translate(&mut self, va: VirtualAddress) -> Result<PhysicalAddress, AccessError> {
        if !self.machine.vm_enabled() {
            return Ok(PhysicalAddress::new(va.as_u64()));
        }

        let page = va.page();
        let entry = if let Some(raw) = self.machine.tlb_lookup(page) {
            PageEntry::from_bits(raw)
        } else {
            let entry = match Region::of(va) {
                Some(Region::Kernel) => self.kernel.entry(page),
                Some(Region::User) => self.user.and_then(|u| u.table().entry(page)),
                None => None,
            }
            .ok_or(AccessError::OutOfRegion(va))?;
            if entry.valid() {
                self.machine.tlb_fill(page, entry.into_bits());
            }
            entry
        };

        if !entry.valid() {
            return Err(AccessError::Unmapped(va));
        }
        Ok(entry.frame().join(va.offset()))
    }

    /// Reads `buf.len()` bytes starting at `va`.
    ///
    /// # Errors
    /// The first translation or bus failure; `buf` may be partially filled.
    pub fn read(&mut self, va: VirtualAddress, buf: &mut [u8]) -> Result<(), AccessError> {
        let mut done = 0usize;
        while done < buf.len() {
            let at = va
                .checked_add(done as u64)
                .ok_or(AccessError::OutOfRegion(va))?;
            let chunk = chunk_len(at, buf.len() - done);
            let pa = self.translate(at)?;
            self.machine.phys_read(pa, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Writes `data` starting at `va`.
    ///
    /// # Errors
    /// The first translation or bus failure; a prefix may have been written.
    pub fn write(&mut self, va: VirtualAddress, data: &[u8]) -> Result<(), AccessError> {
        let mut done = 0usize;
        while done < data.len() {
            let at = va
                .checked_add(done as u64)
                .ok_or(AccessError::OutOfRegion(va))?;
            let chunk = chunk_len(at, data.len() - done);
            let pa = self.translate(at)?;
            self.machine.phys_write(pa, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Reads a little-endian machine word.
    ///
    /// # Errors
    /// As [`read`](Self::read).
    pub fn read_u64(&mut self, va: VirtualAddress) -> Result<u64, AccessError> {
        let mut bytes = [0u8; 8];
        self.read(va, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Writes a little-endian machine word.
    ///
    /// # Errors
    /// As [`write`](Self::write).
    pub fn write_u64(&mut self, va: VirtualAddress, value: u64) -> Result<(), AccessError> {
        self.write(va, &value.to_le_bytes())
    }

    fn user_space(&self, va: VirtualAddress) -> Result<&'a UserAddressSpace, AccessError> {
        self.user.ok_or(AccessError::OutOfRegion(va))
    }

    /// Validates and copies in a NUL-terminated user string of at most
    /// [`MAX_CHECK`] bytes (terminator included). The terminator is not
    /// part of the result.
    ///
    /// # Errors
    /// A failing [`UserAddressSpace::check_address`] on any scanned byte, or
    /// [`AccessError::Unterminated`] if no NUL appears within the bound.
    pub fn check_string(&mut self, va: VirtualAddress) -> Result<Vec<u8>, AccessError> {
        let space = self.user_space(va)?;
        let mut out = Vec::new();
        let mut at = va;
        for _ in 0..MAX_CHECK {
            space.check_address(at, Protection::READ)?;
            let mut byte = [0u8; 1];
            self.read(at, &mut byte)?;
            if byte[0] == 0 {
                return Ok(out);
            }
            out.push(byte[0]);
            at = at.checked_add(1).ok_or(AccessError::OutOfRegion(at))?;
        }
        Err(AccessError::Unterminated(va))
    }

    /// Validates and copies in a null-terminated array of user string
    /// pointers of at most [`MAX_CHECK`] entries, each checked with
    /// [`check_string`](Self::check_string).
    ///
    /// # Errors
    /// The first failing pointer or string check, or
    /// [`AccessError::Unterminated`] if the array has no null entry within
    /// the bound.
    pub fn check_args(&mut self, va: VirtualAddress) -> Result<Vec<Vec<u8>>, AccessError> {
        let space = self.user_space(va)?;
        let mut args = Vec::new();
        let mut slot = va;
        for _ in 0..MAX_CHECK {
            space.check_buffer(slot, 8, Protection::READ)?;
            let ptr = self.read_u64(slot)?;
            if ptr == 0 {
                return Ok(args);
            }
            args.push(self.check_string(VirtualAddress::new(ptr))?);
            slot = slot.checked_add(8).ok_or(AccessError::OutOfRegion(slot))?;
        }
        Err(AccessError::Unterminated(va))
    }
}

/// Bytes from `at` to the end of its page, capped at `remaining`.
#[allow(clippy::cast_possible_truncation)]
fn chunk_len(at: VirtualAddress, remaining: usize) -> usize {
    let in_page = (PAGE_SIZE - at.offset()) as usize;
    in_page.min(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::KernelPageTable;
    use kernel_info::memory::REGION1_BASE;
    use kernel_machine::{Register, SimulatedMachine, TlbFlush};
    use kernel_memory_addresses::PhysicalPage;

    fn machine() -> SimulatedMachine {
        let mut m = SimulatedMachine::new(64 * PAGE_SIZE);
        m.write_register(Register::VmEnable, 1);
        m
    }

    fn user_space() -> UserAddressSpace {
        let mut s = UserAddressSpace::new();
        let base = VirtualAddress::new(REGION1_BASE).page();
        s.table_mut()
            .map(base, PhysicalPage::from_number(10), Protection::READ_WRITE)
            .unwrap();
        s.table_mut()
            .map(base.next(), PhysicalPage::from_number(20), Protection::READ_WRITE)
            .unwrap();
        s
    }

    #[test]
    fn identity_when_translation_is_off() {
        let mut m = SimulatedMachine::new(4 * PAGE_SIZE);
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let mut vm = VirtualMemory::new(&mut m, k.table(), None);
        assert_eq!(
            vm.translate(VirtualAddress::new(0x1234)).unwrap(),
            PhysicalAddress::new(0x1234)
        );
    }

    #[test]
    fn write_crossing_a_page_boundary_lands_in_both_frames() {
        let mut m = machine();
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let s = user_space();
        let at = VirtualAddress::new(REGION1_BASE + PAGE_SIZE - 2);
        VirtualMemory::new(&mut m, k.table(), Some(&s))
            .write(at, b"abcd")
            .unwrap();

        let mut buf = [0u8; 2];
        m.phys_read(PhysicalPage::from_number(10).join(PAGE_SIZE - 2), &mut buf)
            .unwrap();
        assert_eq!(&buf, b"ab");
        m.phys_read(PhysicalPage::from_number(20).base(), &mut buf)
            .unwrap();
        assert_eq!(&buf, b"cd");
    }

    #[test]
    fn stale_translation_survives_until_flushed() {
        let mut m = machine();
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let mut s = user_space();
        let va = VirtualAddress::new(REGION1_BASE);
        VirtualMemory::new(&mut m, k.table(), Some(&s))
            .write_u64(va, 7)
            .unwrap();

        s.table_mut()
            .map(va.page(), PhysicalPage::from_number(30), Protection::READ_WRITE)
            .unwrap();
        assert_eq!(
            VirtualMemory::new(&mut m, k.table(), Some(&s))
                .read_u64(va)
                .unwrap(),
            7
        );

        m.flush_tlb(TlbFlush::Page(va.page()));
        assert_eq!(
            VirtualMemory::new(&mut m, k.table(), Some(&s))
                .read_u64(va)
                .unwrap(),
            0
        );
    }

    #[test]
    fn strings_and_argument_vectors() {
        let mut m = machine();
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let s = user_space();
        let base = VirtualAddress::new(REGION1_BASE);
        let mut vm = VirtualMemory::new(&mut m, k.table(), Some(&s));
        vm.write(base + 0x100, b"init\0").unwrap();
        vm.write(base + 0x200, b"-v\0").unwrap();
        vm.write_u64(base, REGION1_BASE + 0x100).unwrap();
        vm.write_u64(base + 8, REGION1_BASE + 0x200).unwrap();
        vm.write_u64(base + 16, 0).unwrap();

        assert_eq!(vm.check_string(base + 0x100).unwrap(), b"init");
        assert_eq!(
            vm.check_args(base).unwrap(),
            alloc::vec![b"init".to_vec(), b"-v".to_vec()]
        );
        assert!(matches!(
            vm.check_string(VirtualAddress::NULL),
            Err(AccessError::OutOfRegion(_))
        ));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let mut m = machine();
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let s = user_space();
        let base = VirtualAddress::new(REGION1_BASE);
        let mut vm = VirtualMemory::new(&mut m, k.table(), Some(&s));
        vm.write(base, &[b'x'; MAX_CHECK + 4]).unwrap();
        assert!(matches!(
            vm.check_string(base),
            Err(AccessError::Unterminated(_))
        ));
    }

    #[test]
    fn string_running_off_the_mapping_is_rejected() {
        let mut m = machine();
        let k = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
        let s = user_space();
        let end = VirtualAddress::new(REGION1_BASE + 2 * PAGE_SIZE - 3);
        let mut vm = VirtualMemory::new(&mut m, k.table(), Some(&s));
        vm.write(end, b"abc").unwrap();
        assert!(matches!(
            vm.check_string(end),
            Err(AccessError::Unmapped(_))
        ));
    }
}
