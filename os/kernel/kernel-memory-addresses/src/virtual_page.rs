use crate::{PAGE_OFFSET_MASK, PAGE_SHIFT, VirtualAddress};
use core::fmt;

/// Virtual page number (VPN).
///
/// A `VirtualPage` names the page `[number << PAGE_SHIFT, (number + 1) << PAGE_SHIFT)`.
/// Page tables are indexed by the distance of a `VirtualPage` from the first
/// page of their region.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let vp = VirtualPage::containing_address(VirtualAddress::new(0x3FFF));
/// assert_eq!(vp.number(), 3);
/// assert_eq!(vp.base(), VirtualAddress::new(0x3000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    #[inline]
    #[must_use]
    pub const fn from_number(vpn: u64) -> Self {
        Self(vpn)
    }

    /// Page that contains `addr` (aligns down to the page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u64() >> PAGE_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << PAGE_SHIFT)
    }

    /// Combines this page with an in-page byte offset.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        VirtualAddress::new((self.0 << PAGE_SHIFT) | (offset & PAGE_OFFSET_MASK))
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[inline]
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage({:#X} @ {})", self.0, self.base())
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vpn {:#X}", self.0)
    }
}
