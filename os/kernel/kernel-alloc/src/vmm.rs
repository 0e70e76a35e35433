//! Address-space manager.
//!
//! [`Vmm`] edits page tables on behalf of the kernel: it grows and shrinks
//! heaps, grows user stacks on demand, duplicates address spaces and kernel
//! stacks for fork, and releases frames when a process goes away. Every edit
//! to a table that may be live is followed by the matching TLB flush.
//!
//! # Scratch page
//!
//! Copying into a frame that is not mapped anywhere (a child's user page, a
//! child's kernel stack page) goes through the one reserved scratch page in
//! region 0: map the destination frame there, copy through virtual
//! addresses, unmap. Only one such staging operation is ever in flight.
//!
//! # Example
//! ```
//! use kernel_alloc::{frame_alloc::BitmapFrameAlloc, vmm::Vmm};
//! use kernel_machine::{Machine, Register, SimulatedMachine};
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::{KernelPageTable, UserAddressSpace};
//!
//! let mut machine = SimulatedMachine::new(64 * 4096);
//! machine.write_register(Register::VmEnable, 1);
//! let mut frames = BitmapFrameAlloc::new(64);
//! let mut kernel = KernelPageTable::new(VirtualAddress::NULL, VirtualAddress::NULL);
//! let mut space = UserAddressSpace::new();
//!
//! let target = space.brk() + 3 * 4096;
//! let mut vmm = Vmm::new(&mut machine, &mut kernel, &mut frames);
//! vmm.set_break(&mut space, target).unwrap();
//! assert_eq!(space.size(), 3);
//! ```

use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::{
    KERNEL_STACK_PAGES, PAGE_SIZE, Region, SCRATCH_PAGE, kernel_stack_base_page, scratch_page,
};
use kernel_machine::{Machine, TlbFlush};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress, VirtualPage};
use kernel_vmem::{
    AccessError, FrameAlloc, KernelPageTable, KernelStackTable, PageTable, Protection,
    UserAddressSpace, VirtualMemory,
};
use log::{debug, trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("address {0} is outside the range this operation may touch")]
    InvalidAddress(VirtualAddress),
    #[error("growing the stack to {0} would leave no guard page above the heap")]
    StackCollision(VirtualAddress),
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Page table editor over the active machine, the kernel table and a frame
/// pool. Construct one for the duration of an operation.
pub struct Vmm<'m, M: Machine, A: FrameAlloc> {
    machine: &'m mut M,
    kernel: &'m mut KernelPageTable,
    alloc: &'m mut A,
}

impl<'m, M: Machine, A: FrameAlloc> Vmm<'m, M, A> {
    pub const fn new(machine: &'m mut M, kernel: &'m mut KernelPageTable, alloc: &'m mut A) -> Self {
        Self {
            machine,
            kernel,
            alloc,
        }
    }

    /// Moves the user heap boundary of the active address space to `new_brk`.
    ///
    /// Pages are added or removed so that exactly the pages up to
    /// `new_brk` rounded up are mapped. Growth is all or nothing.
    ///
    /// # Errors
    /// * [`VmmError::InvalidAddress`] if `new_brk` is below `data_end` or at
    ///   or above `stack_low`.
    /// * [`VmmError::OutOfMemory`] if the pool cannot supply every new page;
    ///   nothing is allocated.
    pub fn set_break(
        &mut self,
        space: &mut UserAddressSpace,
        new_brk: VirtualAddress,
    ) -> Result<(), VmmError> {
        if new_brk < space.data_end() || new_brk >= space.stack_low() {
            return Err(VmmError::InvalidAddress(new_brk));
        }

        let old_top = space.brk().align_up().page();
        let new_top = new_brk.align_up().page();

        if new_top > old_top {
            Self::map_fresh(
                self.machine,
                self.alloc,
                space.table_mut(),
                &page_range(old_top, new_top),
                Protection::READ_WRITE,
            )?;
        } else {
            for page in page_range(new_top, old_top) {
                Self::unmap_and_free(self.machine, self.alloc, space.table_mut(), page);
            }
        }

        debug!("user brk {} -> {new_brk}", space.brk());
        space.set_brk(new_brk);
        Ok(())
    }

    /// Extends the user stack of the active address space down to the page
    /// containing `fault_addr`.
    ///
    /// # Errors
    /// * [`VmmError::InvalidAddress`] if `fault_addr` is not in region 1 or
    ///   not below the current stack.
    /// * [`VmmError::StackCollision`] if the new stack bottom would leave less
    ///   than one unmapped page above the heap.
    /// * [`VmmError::OutOfMemory`] if the pool cannot cover the gap.
    pub fn grow_stack(
        &mut self,
        space: &mut UserAddressSpace,
        fault_addr: VirtualAddress,
    ) -> Result<(), VmmError> {
        if Region::of(fault_addr) != Some(Region::User) || fault_addr >= space.stack_low() {
            return Err(VmmError::InvalidAddress(fault_addr));
        }

        let target = fault_addr.page();
        let heap_top = space.brk().align_up().as_u64();
        if target.base().as_u64() < heap_top.saturating_add(PAGE_SIZE) {
            return Err(VmmError::StackCollision(fault_addr));
        }

        let pages = page_range(target, space.stack_low().page());
        Self::map_fresh(
            self.machine,
            self.alloc,
            space.table_mut(),
            &pages,
            Protection::READ_WRITE,
        )?;

        debug!("user stack grown to {}", target.base());
        space.set_stack_low(target.base());
        Ok(())
    }

    /// Maps a zeroed frame at `page` of `space`.
    ///
    /// # Errors
    /// [`VmmError::OutOfMemory`], or [`VmmError::InvalidAddress`] if `page`
    /// is not a user page.
    pub fn map_user_page(
        &mut self,
        space: &mut UserAddressSpace,
        page: VirtualPage,
        prot: Protection,
    ) -> Result<PhysicalPage, VmmError> {
        if !space.table().covers(page) {
            return Err(VmmError::InvalidAddress(page.base()));
        }
        Self::unmap_and_free(self.machine, self.alloc, space.table_mut(), page);
        let frame = Self::alloc_zeroed(self.machine, self.alloc)?;
        space.table_mut().map(page, frame, prot)?;
        self.machine.flush_tlb(TlbFlush::Page(page));
        Ok(frame)
    }

    /// Fills `dst` with a private copy of every mapped page of `src`, which
    /// must be the active user address space, and copies its bounds.
    ///
    /// # Errors
    /// [`VmmError::OutOfMemory`] if the pool cannot hold a full copy; `dst`
    /// is left empty.
    pub fn copy_address_space(
        &mut self,
        src: &UserAddressSpace,
        dst: &mut UserAddressSpace,
    ) -> Result<(), VmmError> {
        let needed = src.size();
        if self.alloc.free_frames() < needed {
            warn!("Cannot copy address space: {needed} frames needed");
            return Err(VmmError::OutOfMemory);
        }

        let pages: Vec<_> = src.table().iter_valid().collect();
        for (page, entry) in pages {
            let copied = self
                .alloc
                .alloc_frame()
                .ok_or(VmmError::OutOfMemory)
                .and_then(|frame| {
                    dst.table_mut().map(page, frame, entry.protection())?;
                    self.stage_copy(Some(src), page, frame)
                });
            if let Err(e) = copied {
                Self::release_table(self.alloc, dst.table_mut());
                return Err(e);
            }
        }

        dst.copy_bounds_from(src);
        debug!("copied {needed} pages");
        Ok(())
    }

    /// Copies the contents of the kernel stack currently installed in the
    /// window into freshly allocated frames.
    ///
    /// # Errors
    /// [`VmmError::OutOfMemory`]; nothing stays allocated.
    pub fn copy_kernel_stack(&mut self) -> Result<KernelStackTable, VmmError> {
        let window = self.kernel.kernel_stack();
        let mut copy = KernelStackTable::new();
        let mut page = kernel_stack_base_page();

        for index in 0..KERNEL_STACK_PAGES {
            if self.kernel.table().entry(page).is_some_and(|e| e.valid()) {
                let copied = self
                    .alloc
                    .alloc_frame()
                    .ok_or(VmmError::OutOfMemory)
                    .and_then(|frame| {
                        copy.set(index, frame)?;
                        self.stage_copy(None, page, frame)
                    });
                if let Err(e) = copied {
                    self.destroy_kernel_stack(&mut copy);
                    return Err(e);
                }
            }
            page = page.next();
        }

        trace!("kernel stack {window:?} copied to {copy:?}");
        Ok(copy)
    }

    /// Frees every frame of `space`.
    pub fn destroy_address_space(&mut self, space: &mut UserAddressSpace) {
        let freed = Self::release_table(self.alloc, space.table_mut());
        if freed > 0 {
            self.machine.flush_tlb(TlbFlush::Region1);
        }
        trace!("released {freed} user frames");
    }

    /// Frees every frame of `stack`, which must not be the one installed in
    /// the kernel stack window.
    pub fn destroy_kernel_stack(&mut self, stack: &mut KernelStackTable) {
        debug_assert!(
            stack.is_empty() || self.kernel.kernel_stack() != *stack,
            "destroying the kernel stack in use"
        );
        for frame in stack.take_frames() {
            self.alloc.free_frame(frame);
        }
    }

    /// Moves the kernel heap boundary to `new_brk`.
    ///
    /// Before translation is enabled the kernel runs on the identity-mapped
    /// image and only the boundary is recorded.
    ///
    /// # Errors
    /// * [`VmmError::InvalidAddress`] below the kernel data start or if the
    ///   heap would reach the scratch page.
    /// * [`VmmError::OutOfMemory`]; nothing is allocated.
    pub fn set_kernel_brk(&mut self, new_brk: VirtualAddress) -> Result<(), VmmError> {
        if new_brk < self.kernel.data_start() || new_brk.align_up().as_u64() > SCRATCH_PAGE {
            return Err(VmmError::InvalidAddress(new_brk));
        }

        if self.machine.vm_enabled() {
            let old_top = self.kernel.brk().align_up().page();
            let new_top = new_brk.align_up().page();
            if new_top > old_top {
                Self::map_fresh(
                    self.machine,
                    self.alloc,
                    self.kernel.table_mut(),
                    &page_range(old_top, new_top),
                    Protection::READ_WRITE,
                )?;
            } else {
                for page in page_range(new_top, old_top) {
                    Self::unmap_and_free(self.machine, self.alloc, self.kernel.table_mut(), page);
                }
            }
        }

        debug!("kernel brk {} -> {new_brk}", self.kernel.brk());
        self.kernel.set_brk(new_brk);
        Ok(())
    }

    /// Allocates and maps one fresh frame per page, or nothing at all.
    fn map_fresh<const N: usize>(
        machine: &mut M,
        alloc: &mut A,
        table: &mut PageTable<N>,
        pages: &[VirtualPage],
        prot: Protection,
    ) -> Result<(), VmmError> {
        if alloc.free_frames() < pages.len() {
            warn!(
                "Refusing to map {} pages with {} frames free",
                pages.len(),
                alloc.free_frames()
            );
            return Err(VmmError::OutOfMemory);
        }

        for (done, &page) in pages.iter().enumerate() {
            let mapped = Self::alloc_zeroed(machine, alloc)
                .and_then(|frame| table.map(page, frame, prot).map_err(VmmError::from));
            if let Err(e) = mapped {
                for &undo in &pages[..done] {
                    Self::unmap_and_free(machine, alloc, table, undo);
                }
                return Err(e);
            }
            machine.flush_tlb(TlbFlush::Page(page));
        }
        Ok(())
    }

    fn unmap_and_free<const N: usize>(
        machine: &mut M,
        alloc: &mut A,
        table: &mut PageTable<N>,
        page: VirtualPage,
    ) {
        if let Some(frame) = table.unmap(page) {
            alloc.free_frame(frame);
            machine.flush_tlb(TlbFlush::Page(page));
        }
    }

    fn release_table<const N: usize>(alloc: &mut A, table: &mut PageTable<N>) -> usize {
        let pages: Vec<_> = table.iter_valid().map(|(page, _)| page).collect();
        for &page in &pages {
            if let Some(frame) = table.unmap(page) {
                alloc.free_frame(frame);
            }
        }
        pages.len()
    }

    fn alloc_zeroed(machine: &mut M, alloc: &mut A) -> Result<PhysicalPage, VmmError> {
        let frame = alloc.alloc_frame().ok_or(VmmError::OutOfMemory)?;
        let zeroes = vec![0u8; page_bytes()];
        if let Err(e) = machine.phys_write(frame.base(), &zeroes) {
            alloc.free_frame(frame);
            return Err(AccessError::from(e).into());
        }
        Ok(frame)
    }

    /// Copies the page at `from` (translated through the kernel table and
    /// `user`) into `frame` by way of the scratch page.
    fn stage_copy(
        &mut self,
        user: Option<&UserAddressSpace>,
        from: VirtualPage,
        frame: PhysicalPage,
    ) -> Result<(), VmmError> {
        let scratch = scratch_page();
        debug_assert!(
            !self.kernel.table().entry(scratch).is_some_and(|e| e.valid()),
            "scratch page already in use"
        );

        self.kernel
            .table_mut()
            .map(scratch, frame, Protection::READ_WRITE)?;
        self.machine.flush_tlb(TlbFlush::Page(scratch));

        let mut buf = vec![0u8; page_bytes()];
        let copied = {
            let mut vm = VirtualMemory::new(&mut *self.machine, self.kernel.table(), user);
            vm.read(from.base(), &mut buf)
                .and_then(|()| vm.write(scratch.base(), &buf))
        };

        self.kernel.table_mut().unmap(scratch);
        self.machine.flush_tlb(TlbFlush::Page(scratch));
        copied.map_err(VmmError::from)
    }
}

/// Pages `from..to` (exclusive).
fn page_range(from: VirtualPage, to: VirtualPage) -> Vec<VirtualPage> {
    (from.number()..to.number())
        .map(VirtualPage::from_number)
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
const fn page_bytes() -> usize {
    PAGE_SIZE as usize
}
