//! # Region Page Tables

use crate::AccessError;
use crate::page_entry_bits::{PageEntry, Protection};
use alloc::vec::Vec;
use kernel_info::memory::{
    KERNEL_STACK_PAGES, PAGE_SIZE, REGION0_PAGES, REGION1_PAGES, Region, kernel_stack_base_page,
};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress, VirtualPage};
use log::trace;

/// A single-level table of `N` entries mapping the pages starting at `base`.
#[derive(Clone, PartialEq, Eq)]
pub struct PageTable<const N: usize> {
    base: VirtualPage,
    entries: [PageEntry; N],
}

/// Region 1 table; one per process.
pub type UserPageTable = PageTable<REGION1_PAGES>;

impl<const N: usize> PageTable<N> {
    /// A table with every entry invalid.
    #[must_use]
    pub const fn new(base: VirtualPage) -> Self {
        Self {
            base,
            entries: [PageEntry::invalid(); N],
        }
    }

    /// First page covered by the table.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualPage {
        self.base
    }

    #[inline]
    fn index(&self, page: VirtualPage) -> Option<usize> {
        let i = usize::try_from(page.number().checked_sub(self.base.number())?).ok()?;
        (i < N).then_some(i)
    }

    /// Whether `page` falls inside this table.
    #[inline]
    #[must_use]
    pub fn covers(&self, page: VirtualPage) -> bool {
        self.index(page).is_some()
    }

    /// The entry for `page`, or `None` if the table does not cover it.
    #[must_use]
    pub fn entry(&self, page: VirtualPage) -> Option<PageEntry> {
        self.index(page).map(|i| self.entries[i])
    }

    /// Maps `page` to `frame`. The previous entry is overwritten; callers
    /// unmap first if they own the old frame.
    ///
    /// # Errors
    /// [`AccessError::OutOfRegion`] if the table does not cover `page`.
    pub fn map(
        &mut self,
        page: VirtualPage,
        frame: PhysicalPage,
        prot: Protection,
    ) -> Result<(), AccessError> {
        let i = self
            .index(page)
            .ok_or(AccessError::OutOfRegion(page.base()))?;
        trace!("map {page} -> {frame} {prot:?}");
        self.entries[i] = PageEntry::mapped(frame, prot);
        Ok(())
    }

    /// Invalidates the entry for `page` and returns the frame it mapped.
    pub fn unmap(&mut self, page: VirtualPage) -> Option<PhysicalPage> {
        let i = self.index(page)?;
        let old = core::mem::replace(&mut self.entries[i], PageEntry::invalid());
        if !old.valid() {
            return None;
        }
        trace!("unmap {page} (was {})", old.frame());
        Some(old.frame())
    }

    /// All valid entries in ascending page order.
    pub fn iter_valid(&self) -> impl Iterator<Item = (VirtualPage, PageEntry)> + '_ {
        let base = self.base.number();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.valid())
            .map(move |(i, e)| (VirtualPage::from_number(base + i as u64), *e))
    }

    /// Number of valid entries.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.valid()).count()
    }
}

impl UserPageTable {
    /// An empty region 1 table.
    #[must_use]
    pub const fn user() -> Self {
        Self::new(Region::User.base_page())
    }
}

impl<const N: usize> core::fmt::Debug for PageTable<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageTable")
            .field("base", &self.base)
            .field("valid", &self.valid_count())
            .finish_non_exhaustive()
    }
}

/// The shared region 0 table together with the kernel heap boundary.
#[derive(Debug, Clone)]
pub struct KernelPageTable {
    table: PageTable<REGION0_PAGES>,
    data_start: VirtualAddress,
    brk: VirtualAddress,
}

impl KernelPageTable {
    /// An empty table for a kernel whose data segment starts at `data_start`
    /// and whose heap currently ends at `brk`.
    #[must_use]
    pub const fn new(data_start: VirtualAddress, brk: VirtualAddress) -> Self {
        Self {
            table: PageTable::new(Region::Kernel.base_page()),
            data_start,
            brk,
        }
    }

    /// First address of kernel data; the heap never shrinks below it.
    #[inline]
    #[must_use]
    pub const fn data_start(&self) -> VirtualAddress {
        self.data_start
    }

    #[inline]
    #[must_use]
    pub const fn table(&self) -> &PageTable<REGION0_PAGES> {
        &self.table
    }

    #[inline]
    pub const fn table_mut(&mut self) -> &mut PageTable<REGION0_PAGES> {
        &mut self.table
    }

    /// Current top of the kernel heap.
    #[inline]
    #[must_use]
    pub const fn brk(&self) -> VirtualAddress {
        self.brk
    }

    #[inline]
    pub const fn set_brk(&mut self, brk: VirtualAddress) {
        self.brk = brk;
    }

    /// Points the kernel stack window at the frames of `stack`.
    ///
    /// Invalid entries of `stack` leave the matching window page unmapped.
    /// The caller flushes [`TlbFlush::KernelStack`](kernel_machine::TlbFlush::KernelStack).
    pub fn install_kernel_stack(&mut self, stack: &KernelStackTable) {
        let mut page = kernel_stack_base_page();
        for entry in &stack.entries {
            if let Some(i) = self.table.index(page) {
                self.table.entries[i] = *entry;
            }
            page = page.next();
        }
        trace!("kernel stack window -> {stack:?}");
    }

    /// The entries currently installed in the kernel stack window.
    #[must_use]
    pub fn kernel_stack(&self) -> KernelStackTable {
        let mut stack = KernelStackTable::new();
        let mut page = kernel_stack_base_page();
        for slot in &mut stack.entries {
            *slot = self.table.entry(page).unwrap_or_default();
            page = page.next();
        }
        stack
    }
}

/// The private frames backing one process' kernel stack.
///
/// Only one of these is installed in the kernel stack window at a time.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct KernelStackTable {
    entries: [PageEntry; KERNEL_STACK_PAGES],
}

impl KernelStackTable {
    /// A table with no frames.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [PageEntry::invalid(); KERNEL_STACK_PAGES],
        }
    }

    /// Stores `frame` as the backing of the `index`-th window page.
    ///
    /// # Errors
    /// [`AccessError::OutOfRegion`] if `index` is past the window.
    pub fn set(&mut self, index: usize, frame: PhysicalPage) -> Result<(), AccessError> {
        let slot = self.entries.get_mut(index).ok_or_else(|| {
            AccessError::OutOfRegion(kernel_stack_base_page().base() + (index as u64) * PAGE_SIZE)
        })?;
        *slot = PageEntry::mapped(frame, Protection::READ_WRITE);
        Ok(())
    }

    /// Backing frames in window order.
    pub fn frames(&self) -> impl Iterator<Item = PhysicalPage> + '_ {
        self.entries.iter().filter(|e| e.valid()).map(PageEntry::frame)
    }

    /// Removes and returns every backing frame.
    pub fn take_frames(&mut self) -> Vec<PhysicalPage> {
        let taken = core::mem::replace(&mut self.entries, [PageEntry::invalid(); KERNEL_STACK_PAGES]);
        taken
            .into_iter()
            .filter(PageEntry::valid)
            .map(|e| e.frame())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| !e.valid())
    }
}

impl core::fmt::Debug for KernelStackTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.frames()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::{KERNEL_STACK_BASE, REGION1_BASE, REGION1_LIMIT};

    #[test]
    fn user_table_covers_region1_only() {
        let t = UserPageTable::user();
        assert!(t.covers(VirtualAddress::new(REGION1_BASE).page()));
        assert!(t.covers(VirtualAddress::new(REGION1_LIMIT - 1).page()));
        assert!(!t.covers(VirtualAddress::new(REGION1_LIMIT).page()));
        assert!(!t.covers(VirtualAddress::new(0x1000).page()));
    }

    #[test]
    fn map_and_unmap_return_frames() {
        let mut t = UserPageTable::user();
        let page = VirtualAddress::new(REGION1_BASE + 0x3000).page();
        t.map(page, PhysicalPage::from_number(9), Protection::READ_WRITE)
            .unwrap();
        assert_eq!(t.valid_count(), 1);
        assert_eq!(t.iter_valid().next().map(|(p, _)| p), Some(page));
        assert_eq!(t.unmap(page), Some(PhysicalPage::from_number(9)));
        assert_eq!(t.unmap(page), None);
        assert_eq!(t.valid_count(), 0);
    }

    #[test]
    fn map_outside_table_is_rejected() {
        let mut t = UserPageTable::user();
        let err = t
            .map(VirtualPage::from_number(1), PhysicalPage::from_number(1), Protection::READ)
            .unwrap_err();
        assert!(matches!(err, AccessError::OutOfRegion(_)));
    }

    #[test]
    fn kernel_stack_window_swaps() {
        let mut k = KernelPageTable::new(VirtualAddress::new(0x8000), VirtualAddress::new(0x2_0000));
        let mut a = KernelStackTable::new();
        a.set(0, PhysicalPage::from_number(100)).unwrap();
        a.set(1, PhysicalPage::from_number(101)).unwrap();
        assert!(a.set(KERNEL_STACK_PAGES, PhysicalPage::from_number(1)).is_err());

        k.install_kernel_stack(&a);
        let top = VirtualAddress::new(KERNEL_STACK_BASE).page();
        assert_eq!(k.table().entry(top).map(|e| e.frame().number()), Some(100));
        assert_eq!(k.kernel_stack(), a);

        let mut b = KernelStackTable::new();
        b.set(0, PhysicalPage::from_number(7)).unwrap();
        k.install_kernel_stack(&b);
        assert!(!k.table().entry(top.next()).unwrap().valid());

        assert_eq!(a.take_frames().len(), 2);
        assert!(a.is_empty());
    }
}
