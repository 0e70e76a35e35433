//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw addresses and page numbers used by the
//! simulated machine's paging hardware and the kernel's memory manager.
//!
//! ## Overview
//!
//! The simulated platform has a single page size ([`PAGE_SIZE`]) and two
//! address spaces that must never be confused:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | An address as seen by code running on the CPU, translated by the page tables. |
//! | [`VirtualPage`] | A virtual page number (VPN), i.e. `address >> PAGE_SHIFT`. |
//! | [`PhysicalAddress`] | A byte offset into physical memory. |
//! | [`PhysicalPage`] | A physical frame number (PFN). |
//!
//! All four are `#[repr(transparent)]` around `u64` and are `Copy`, `Ord`
//! and `Hash`, so they can be used as map keys and in `const` contexts.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0010_2345);
//! let page = va.page();
//! assert_eq!(page.number(), 0x102);
//! assert_eq!(page.base().as_u64(), 0x0010_2000);
//! assert_eq!(page.join(va.offset()), va);
//!
//! let frame = PhysicalPage::from_number(7);
//! assert_eq!(frame.base().as_u64(), 7 * PAGE_SIZE);
//! ```
//!
//! ## Rounding
//!
//! [`VirtualAddress::align_up`] and [`VirtualAddress::align_down`] mirror the
//! classic `UP_TO_PAGE` / `DOWN_TO_PAGE` helpers used when deciding which
//! pages a break or stack pointer covers.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Number of address bits covered by the in-page offset.
pub const PAGE_SHIFT: u32 = 12;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Mask selecting the in-page offset of an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Rounds `value` up to the next multiple of [`PAGE_SIZE`].
///
/// Saturates at the last page boundary representable in `u64`.
#[inline]
#[must_use]
pub const fn page_align_up(value: u64) -> u64 {
    match value.checked_add(PAGE_OFFSET_MASK) {
        Some(v) => v & !PAGE_OFFSET_MASK,
        None => u64::MAX & !PAGE_OFFSET_MASK,
    }
}

/// Rounds `value` down to a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn page_align_down(value: u64) -> u64 {
    value & !PAGE_OFFSET_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_helpers() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align_down(PAGE_SIZE + 5), PAGE_SIZE);
        assert_eq!(page_align_up(u64::MAX), u64::MAX & !PAGE_OFFSET_MASK);
    }

    #[test]
    fn page_and_frame_round_trip() {
        let va = VirtualAddress::new(0x0012_3456);
        assert_eq!(va.page().join(va.offset()), va);
        assert_eq!(va.offset(), 0x456);

        let pa = PhysicalAddress::new(0x0004_2010);
        assert_eq!(pa.frame().number(), 0x42);
        assert_eq!(pa.frame().join(pa.offset()), pa);
    }

    #[test]
    fn page_neighbours() {
        let p = VirtualPage::from_number(10);
        assert_eq!(p.next().number(), 11);
        assert_eq!(p.prev().map(VirtualPage::number), Some(9));
        assert_eq!(VirtualPage::from_number(0).prev(), None);
    }
}
