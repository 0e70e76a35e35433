//! # Memory Layout
//!
//! The simulated machine exposes two virtual regions of equal size:
//!
//! ```text
//! REGION0_BASE         ┌─────────────────────────────────┐ 0x0000_0000
//!                      │  Kernel text (R+X, identity)    │
//!                      ├─────────────────────────────────┤ kernel data start
//!                      │  Kernel data + heap (R+W)       │
//!                      ├─────────────────────────────────┤ kernel brk
//!                      │        (unmapped)               │
//! SCRATCH_PAGE         ├─────────────────────────────────┤ 0x000F_D000
//!                      │  Scratch page (staging copies)  │
//! KERNEL_STACK_BASE    ├─────────────────────────────────┤ 0x000F_E000
//!                      │  Kernel stack window            │
//! REGION0_LIMIT        ├═════════════════════════════════┤ 0x0010_0000
//! REGION1_BASE         │  User text / data / bss         │
//!                      ├─────────────────────────────────┤ data_end
//!                      │  User heap (grows up to brk)    │
//!                      │        (unmapped gap)           │
//!                      │  User stack (grows down)        │ stack_low
//! REGION1_LIMIT        └─────────────────────────────────┘ 0x0020_0000
//! ```
//!
//! Region 0 is shared by every process; only the kernel stack window changes
//! when the CPU moves between processes. Region 1 is private per process.

use kernel_memory_addresses::{VirtualAddress, VirtualPage};

pub use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE};

/// First address of the kernel region.
pub const REGION0_BASE: u64 = 0x0000_0000;

/// Size of the kernel region in bytes.
pub const REGION0_SIZE: u64 = 0x0010_0000;

/// First address above the kernel region.
pub const REGION0_LIMIT: u64 = REGION0_BASE + REGION0_SIZE;

/// First address of the per-process user region.
pub const REGION1_BASE: u64 = REGION0_LIMIT;

/// Size of the user region in bytes.
pub const REGION1_SIZE: u64 = 0x0010_0000;

/// First address above the user region.
pub const REGION1_LIMIT: u64 = REGION1_BASE + REGION1_SIZE;

/// Number of page table entries covering region 0.
pub const REGION0_PAGES: usize = (REGION0_SIZE / PAGE_SIZE) as usize;

/// Number of page table entries covering region 1.
pub const REGION1_PAGES: usize = (REGION1_SIZE / PAGE_SIZE) as usize;

/// Maximum size of a process' kernel stack.
pub const KERNEL_STACK_MAXSIZE: u64 = 2 * PAGE_SIZE;

/// Upper end (exclusive) of the kernel stack window.
pub const KERNEL_STACK_LIMIT: u64 = REGION0_LIMIT;

/// Lowest address of the kernel stack window.
pub const KERNEL_STACK_BASE: u64 = KERNEL_STACK_LIMIT - KERNEL_STACK_MAXSIZE;

/// Number of pages in a kernel stack.
pub const KERNEL_STACK_PAGES: usize = (KERNEL_STACK_MAXSIZE / PAGE_SIZE) as usize;

/// The one kernel page reserved for staging copies between frames that cannot
/// be mapped at the same time. It sits directly below the kernel stack window.
pub const SCRATCH_PAGE: u64 = KERNEL_STACK_BASE - PAGE_SIZE;

/// Number of terminals attached to the machine.
pub const NUM_TERMINALS: usize = 4;

/// Longest line the terminal hardware transmits or receives in one go.
pub const TERMINAL_MAX_LINE: usize = 1024;

/// Capacity of a pipe's circular buffer.
pub const PIPE_BUFFER_LEN: usize = 256;

/// Upper bound on string length and argument count scanned when validating
/// user pointers.
pub const MAX_CHECK: usize = 256;

/// Number of user stack pages mapped for a freshly loaded program.
pub const INITIAL_STACK_PAGES: u64 = 1;

/// Which virtual region an address falls into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Region {
    /// Region 0, shared kernel space.
    Kernel,
    /// Region 1, private user space.
    User,
}

impl Region {
    /// Classifies `va`, or returns `None` if it lies above region 1.
    #[must_use]
    pub const fn of(va: VirtualAddress) -> Option<Self> {
        let v = va.as_u64();
        if v < REGION0_LIMIT {
            Some(Self::Kernel)
        } else if v < REGION1_LIMIT {
            Some(Self::User)
        } else {
            None
        }
    }

    /// First page of the region.
    #[must_use]
    pub const fn base_page(self) -> VirtualPage {
        match self {
            Self::Kernel => VirtualPage::containing_address(VirtualAddress::new(REGION0_BASE)),
            Self::User => VirtualPage::containing_address(VirtualAddress::new(REGION1_BASE)),
        }
    }
}

/// First page of the kernel stack window.
#[must_use]
pub const fn kernel_stack_base_page() -> VirtualPage {
    VirtualPage::containing_address(VirtualAddress::new(KERNEL_STACK_BASE))
}

/// The scratch page as a [`VirtualPage`].
#[must_use]
pub const fn scratch_page() -> VirtualPage {
    VirtualPage::containing_address(VirtualAddress::new(SCRATCH_PAGE))
}

const _: () = {
    assert!(REGION0_BASE.is_multiple_of(PAGE_SIZE));
    assert!(REGION1_BASE.is_multiple_of(PAGE_SIZE));
    assert!(REGION1_LIMIT.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_STACK_MAXSIZE.is_multiple_of(PAGE_SIZE));
    assert!(SCRATCH_PAGE + PAGE_SIZE == KERNEL_STACK_BASE);
    assert!(TERMINAL_MAX_LINE > 0);
    assert!(PIPE_BUFFER_LEN > 0);
    assert!(INITIAL_STACK_PAGES < REGION1_PAGES as u64);
};
