//! # Simulated Machine Interface
//!
//! The kernel never touches hardware directly. Everything it needs from the
//! platform goes through the [`Machine`] trait:
//!
//! * **Registers**: page table base/limit registers, the VM enable flag and
//!   the TLB flush command register ([`Register`], [`TlbFlushCommand`])
//! * **Translation cache**: lookups and fills of cached page table entries,
//!   invalidated through the flush register
//! * **Physical memory**: raw byte access by [`PhysicalAddress`]
//! * **Trap state**: the [`UserContext`] the CPU saved on the way into the
//!   kernel and restores on the way out
//! * **Terminals**: asynchronous transmit and line-oriented receive
//! * **Halt**
//!
//! [`SimulatedMachine`] implements the trait entirely in memory so a kernel
//! can be constructed, driven with synthetic traps, inspected and dropped in
//! a unit test.
//!
//! ```rust
//! use kernel_machine::{Machine, SimulatedMachine, TlbFlush};
//! use kernel_memory_addresses::{PhysicalAddress, VirtualPage};
//!
//! let mut m = SimulatedMachine::new(64 * 4096);
//! m.phys_write(PhysicalAddress::new(0x1000), b"abc").unwrap();
//! let mut buf = [0u8; 3];
//! m.phys_read(PhysicalAddress::new(0x1000), &mut buf).unwrap();
//! assert_eq!(&buf, b"abc");
//!
//! m.tlb_fill(VirtualPage::from_number(0x105), 0xdead);
//! m.flush_tlb(TlbFlush::Region1);
//! assert_eq!(m.tlb_lookup(VirtualPage::from_number(0x105)), None);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod context;
mod registers;
#[cfg(feature = "simulated")]
mod simulated;

pub use context::{MemoryFaultKind, NUM_REGS, TrapVector, UserContext};
pub use registers::{Register, TlbFlush, TlbFlushCommand};
#[cfg(feature = "simulated")]
pub use simulated::{SimulatedMachine, SimulatedTerminal};

use kernel_memory_addresses::{PhysicalAddress, VirtualPage};

/// Access to physical memory outside the installed range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("bus error: physical access at {addr} (+{len} bytes) is outside installed memory")]
pub struct BusError {
    pub addr: PhysicalAddress,
    pub len: usize,
}

/// The hardware primitives the kernel is built on.
///
/// Implementations are expected to behave like the real device: a page
/// table edit is not visible to translation until the matching entry is
/// flushed, a terminal transmission completes only when the platform raises
/// the transmit trap, and [`halt`](Machine::halt) stops the CPU for good.
pub trait Machine {
    fn read_register(&self, reg: Register) -> u64;

    fn write_register(&mut self, reg: Register, value: u64);

    /// Invalidates cached translations via the TLB flush register.
    fn flush_tlb(&mut self, flush: TlbFlush) {
        self.write_register(Register::TlbFlush, TlbFlushCommand::from(flush).into_bits());
    }

    /// Whether address translation is switched on.
    fn vm_enabled(&self) -> bool {
        self.read_register(Register::VmEnable) != 0
    }

    /// A cached raw page table entry for `page`, if any.
    fn tlb_lookup(&self, page: VirtualPage) -> Option<u64>;

    /// Caches the raw page table entry used to translate `page`.
    fn tlb_fill(&mut self, page: VirtualPage, entry: u64);

    /// Size of installed physical memory in bytes.
    fn pmem_size(&self) -> u64;

    /// Reads `buf.len()` bytes of physical memory starting at `addr`.
    ///
    /// # Errors
    /// [`BusError`] if the range is not backed by installed memory.
    fn phys_read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> Result<(), BusError>;

    /// Writes `data` to physical memory starting at `addr`.
    ///
    /// # Errors
    /// [`BusError`] if the range is not backed by installed memory.
    fn phys_write(&mut self, addr: PhysicalAddress, data: &[u8]) -> Result<(), BusError>;

    /// The user-mode state saved by the CPU on trap entry.
    fn user_context(&self) -> &UserContext;

    /// The user-mode state the CPU restores when the trap handler returns.
    fn user_context_mut(&mut self) -> &mut UserContext;

    /// Starts transmitting `data` on terminal `tty`. Completion is signalled
    /// later by a [`TrapVector::TtyTransmit`] trap.
    fn tty_transmit(&mut self, tty: usize, data: &[u8]);

    /// Copies the most recently received line of terminal `tty` into `buf`
    /// and returns its length.
    fn tty_receive(&mut self, tty: usize, buf: &mut [u8]) -> usize;

    /// Stops the machine.
    fn halt(&mut self);
}
