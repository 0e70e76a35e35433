use kernel_memory_addresses::VirtualAddress;

/// Number of general purpose registers saved in a [`UserContext`].
pub const NUM_REGS: usize = 8;

/// Hardware trap vectors.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum TrapVector {
    /// Syscall; the syscall number is in [`UserContext::code`].
    #[default]
    Kernel = 0,
    Clock = 1,
    Illegal = 2,
    /// Page fault; [`UserContext::addr`] holds the faulting address and
    /// [`UserContext::code`] a [`MemoryFaultKind`].
    Memory = 3,
    Math = 4,
    /// A line arrived; [`UserContext::code`] is the terminal number.
    TtyReceive = 5,
    /// A transmission finished; [`UserContext::code`] is the terminal number.
    TtyTransmit = 6,
    Disk = 7,
}

/// Why a memory trap was raised.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u64)]
pub enum MemoryFaultKind {
    /// No valid mapping for the address.
    Unmapped = 1,
    /// A mapping exists but does not permit the access.
    Protection = 2,
}

impl MemoryFaultKind {
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Unmapped),
            2 => Some(Self::Protection),
            _ => None,
        }
    }
}

/// User-mode CPU state as saved on trap entry.
///
/// The kernel copies this into the running process' control block on every
/// trap and copies the (possibly different) running process' state back out
/// before returning to user mode.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct UserContext {
    pub vector: TrapVector,
    pub code: u64,
    pub addr: VirtualAddress,
    pub pc: VirtualAddress,
    pub sp: VirtualAddress,
    pub regs: [u64; NUM_REGS],
}

impl UserContext {
    /// Places a syscall return value in the return register.
    #[inline]
    pub const fn set_return(&mut self, value: i64) {
        self.regs[0] = value.cast_unsigned();
    }

    /// The value in the return register, as the user sees it.
    #[inline]
    #[must_use]
    pub const fn return_value(&self) -> i64 {
        self.regs[0].cast_signed()
    }
}
