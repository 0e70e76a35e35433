use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualPage;

/// Privileged registers of the simulated MMU.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Register {
    /// Base of the trap vector table.
    VectorBase = 0,
    /// Region 0 page table base.
    Ptbr0 = 1,
    /// Region 0 page table length in entries.
    Ptlr0 = 2,
    /// Region 1 page table base.
    Ptbr1 = 3,
    /// Region 1 page table length in entries.
    Ptlr1 = 4,
    /// Non-zero once virtual memory is enabled.
    VmEnable = 5,
    /// Write-only TLB flush command, see [`TlbFlushCommand`].
    TlbFlush = 6,
}

impl Register {
    pub const COUNT: usize = 7;

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// What to drop from the translation cache.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TlbFlush {
    /// A single page.
    Page(VirtualPage),
    /// Everything.
    All,
    /// Every region 0 translation.
    Region0,
    /// Every region 1 translation.
    Region1,
    /// The kernel stack window only.
    KernelStack,
}

/// Encoded value written to [`Register::TlbFlush`].
///
/// | Bits   | Field        | Meaning |
/// |--------|--------------|---------|
/// | 0..=2  | `class`      | 0 = page, 1 = all, 2 = region 0, 3 = region 1, 4 = kernel stack |
/// | 3..=11 | reserved     | must be zero |
/// | 12..=63| `page`       | virtual page number, only meaningful for class 0 |
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct TlbFlushCommand {
    #[bits(3)]
    pub class: u8,

    #[bits(9)]
    __: u16,

    #[bits(52)]
    pub page: u64,
}

impl TlbFlushCommand {
    const CLASS_PAGE: u8 = 0;
    const CLASS_ALL: u8 = 1;
    const CLASS_REGION0: u8 = 2;
    const CLASS_REGION1: u8 = 3;
    const CLASS_KERNEL_STACK: u8 = 4;

    /// Decodes the command, or `None` for a reserved class.
    #[must_use]
    pub const fn decode(self) -> Option<TlbFlush> {
        match self.class() {
            Self::CLASS_PAGE => Some(TlbFlush::Page(VirtualPage::from_number(self.page()))),
            Self::CLASS_ALL => Some(TlbFlush::All),
            Self::CLASS_REGION0 => Some(TlbFlush::Region0),
            Self::CLASS_REGION1 => Some(TlbFlush::Region1),
            Self::CLASS_KERNEL_STACK => Some(TlbFlush::KernelStack),
            _ => None,
        }
    }
}

impl From<TlbFlush> for TlbFlushCommand {
    fn from(value: TlbFlush) -> Self {
        match value {
            TlbFlush::Page(page) => Self::new()
                .with_class(Self::CLASS_PAGE)
                .with_page(page.number()),
            TlbFlush::All => Self::new().with_class(Self::CLASS_ALL),
            TlbFlush::Region0 => Self::new().with_class(Self::CLASS_REGION0),
            TlbFlush::Region1 => Self::new().with_class(Self::CLASS_REGION1),
            TlbFlush::KernelStack => Self::new().with_class(Self::CLASS_KERNEL_STACK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_commands_decode_to_what_was_encoded() {
        for flush in [
            TlbFlush::Page(VirtualPage::from_number(0x1FF)),
            TlbFlush::All,
            TlbFlush::Region0,
            TlbFlush::Region1,
            TlbFlush::KernelStack,
        ] {
            let raw = TlbFlushCommand::from(flush).into_bits();
            assert_eq!(TlbFlushCommand::from_bits(raw).decode(), Some(flush));
        }
    }

    #[test]
    fn reserved_class_is_rejected() {
        assert_eq!(TlbFlushCommand::new().with_class(7).decode(), None);
    }
}
