use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// Access rights of a mapping.
///
/// ### Bit layout
///
/// | Bit | Name    | Meaning |
/// |-----|---------|---------|
/// | 0   | `read`  | Loads permitted |
/// | 1   | `write` | Stores permitted |
/// | 2   | `exec`  | Instruction fetch permitted |
///
/// ```rust
/// # use kernel_vmem::Protection;
/// assert!(Protection::READ_WRITE.contains(Protection::READ));
/// assert!(!Protection::READ_EXEC.contains(Protection::WRITE));
/// ```
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
    #[bits(5)]
    __: u8,
}

impl Protection {
    pub const NONE: Self = Self::new();
    pub const READ: Self = Self::new().with_read(true);
    pub const WRITE: Self = Self::new().with_write(true);
    pub const READ_WRITE: Self = Self::new().with_read(true).with_write(true);
    pub const READ_EXEC: Self = Self::new().with_read(true).with_exec(true);

    /// Whether every right in `other` is also granted by `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.into_bits() & other.into_bits() == other.into_bits()
    }
}

/// A single entry of a region page table.
///
/// ### Bit layout
///
/// | Bits    | Name        | Meaning |
/// |---------|-------------|---------|
/// | 0       | `valid`     | Entry maps a frame if set; everything else is don't-care if clear |
/// | 1..=3   | `prot`      | [`Protection`] bits (read, write, exec) |
/// | 4..=11  | reserved    | Ignored by the MMU |
/// | 12..=51 | `pfn`       | Physical frame number |
/// | 52..=63 | reserved    | Ignored by the MMU |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalPage;
/// # use kernel_vmem::{PageEntry, Protection};
/// let e = PageEntry::mapped(PhysicalPage::from_number(0x42), Protection::READ_WRITE);
/// assert!(e.valid());
/// assert_eq!(e.frame().number(), 0x42);
/// assert!(e.protection().contains(Protection::WRITE));
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    /// Valid (bit 0).
    pub valid: bool,

    /// Protection (bits 1..=3).
    #[bits(3)]
    prot_bits: u8,

    #[bits(8)]
    __: u8,

    /// Physical frame number (bits 12..=51).
    #[bits(40)]
    pfn_bits: u64,

    #[bits(12)]
    ___: u16,
}

impl PageEntry {
    /// An entry mapping `frame` with `prot`.
    #[inline]
    #[must_use]
    pub const fn mapped(frame: PhysicalPage, prot: Protection) -> Self {
        Self::new()
            .with_valid(true)
            .with_prot_bits(prot.into_bits())
            .with_pfn_bits(frame.number())
    }

    /// The invalid entry.
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.pfn_bits())
    }

    #[inline]
    #[must_use]
    pub const fn protection(&self) -> Protection {
        Protection::from_bits(self.prot_bits())
    }

    #[inline]
    pub const fn set_protection(&mut self, prot: Protection) {
        self.set_prot_bits(prot.into_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_entry_is_all_zero() {
        assert_eq!(PageEntry::invalid().into_bits(), 0);
        assert!(!PageEntry::invalid().valid());
    }

    #[test]
    fn fields_do_not_overlap() {
        let mut e = PageEntry::mapped(PhysicalPage::from_number((1 << 40) - 1), Protection::NONE);
        assert!(e.valid());
        assert_eq!(e.protection(), Protection::NONE);
        e.set_protection(Protection::READ_EXEC);
        assert_eq!(e.frame().number(), (1 << 40) - 1);
        assert!(e.protection().exec());
        assert!(!e.protection().write());
    }

    #[test]
    fn protection_containment() {
        assert!(Protection::READ_WRITE.contains(Protection::NONE));
        assert!(!Protection::READ.contains(Protection::READ_WRITE));
        assert!(Protection::READ_EXEC.contains(Protection::READ));
    }
}
