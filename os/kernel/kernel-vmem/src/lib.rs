//! # Virtual Memory Support
//!
//! Single-level paging for the simulated machine's two regions.
//!
//! ## What you get
//! - [`PageEntry`] and [`Protection`], bit-exact page table entries.
//! - A fixed-size [`PageTable`] per region: the shared [`KernelPageTable`]
//!   for region 0 and one [`UserPageTable`] per process for region 1, plus
//!   the per-process [`KernelStackTable`] that is swapped into the kernel
//!   stack window.
//! - [`UserAddressSpace`], a user table together with its heap and stack
//!   bounds, and the pointer checks syscalls run before touching user memory.
//! - [`VirtualMemory`], software address translation through the machine's
//!   TLB, used whenever the kernel reads or writes through a virtual address.
//! - The [`FrameAlloc`] interface the memory manager draws frames from.
//!
//! ## Virtual Address → Physical Address
//!
//! Each region is covered by a single table indexed by virtual page number,
//! relative to the region base:
//!
//! ```text
//! | 63 ‒ 12            | 11 ‒ 0 |
//! |  VPN               | Offset |
//!
//! region = VA < REGION0_LIMIT ? 0 : 1
//! entry  = table[region][VPN - base_vpn(region)]
//! PA     = entry.pfn << 12 | Offset
//! ```
//!
//! ## Translation cache
//!
//! Translation consults the machine's TLB first and only walks the table on a
//! miss, caching the entry it found. An edit to a table therefore becomes
//! visible only after the matching flush, exactly as on the real hardware:
//!
//! | Edit | Flush |
//! |------|-------|
//! | one page mapped or unmapped | [`TlbFlush::Page`](kernel_machine::TlbFlush::Page) |
//! | kernel stack window remapped | [`TlbFlush::KernelStack`](kernel_machine::TlbFlush::KernelStack) |
//! | a different user table activated | [`TlbFlush::Region1`](kernel_machine::TlbFlush::Region1) |
//!
//! Kernel accesses only require a valid entry. Protection bits constrain what
//! *user* code may do and are enforced at syscall boundaries by
//! [`UserAddressSpace::check_address`] and friends.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod address_space;
mod mmu;
mod page_entry_bits;
mod page_table;

pub use crate::address_space::UserAddressSpace;
pub use crate::mmu::VirtualMemory;
pub use crate::page_entry_bits::{PageEntry, Protection};
pub use crate::page_table::{KernelPageTable, KernelStackTable, PageTable, UserPageTable};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_machine::BusError;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};

/// Source of physical frames for page tables entries.
///
/// The implementation decides where frames come from; the memory manager
/// only ever asks for one frame at a time and returns frames it unmaps.
pub trait FrameAlloc {
    /// Allocates one frame, or `None` if the pool is exhausted.
    fn alloc_frame(&mut self) -> Option<PhysicalPage>;

    /// Returns `frame` to the pool.
    fn free_frame(&mut self, frame: PhysicalPage);

    /// Number of frames currently available.
    fn free_frames(&self) -> usize;
}

/// Why a virtual access or a user pointer check failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AccessError {
    #[error("address {0} is outside the region it must lie in")]
    OutOfRegion(VirtualAddress),
    #[error("address {0} is not mapped")]
    Unmapped(VirtualAddress),
    #[error("address {addr} does not permit {required:?}")]
    Protection {
        addr: VirtualAddress,
        required: Protection,
    },
    #[error("no terminator found scanning from {0}")]
    Unterminated(VirtualAddress),
    #[error(transparent)]
    Bus(#[from] BusError),
}
