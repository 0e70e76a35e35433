//! # Syscall ABI
//!
//! A process enters the kernel with the syscall number in the trap code and
//! up to three arguments in registers 0, 1 and 2. The result comes back in
//! register 0: a non-negative value on success, a negative error code
//! otherwise ([`ERROR`] being the generic one).
//!
//! ```rust
//! use kernel_machine::UserContext;
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_syscall::{Syscall, Sysno};
//!
//! let mut ctx = UserContext::default();
//! let call = Syscall::PipeWrite { pipe: 3, buf: VirtualAddress::new(0x10_0040), len: 5 };
//! call.encode_into(&mut ctx);
//! assert_eq!(ctx.code, Sysno::PipeWrite as u64);
//! assert_eq!(Syscall::decode(&ctx), Ok(call));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod syscall;

pub use syscall::{DecodeError, Syscall, Sysno};

pub use errno::ERROR;

/// Negative return codes, one per failure kind.
pub mod errno {
    /// Generic failure.
    pub const ERROR: i64 = -1;
    pub const OUT_OF_MEMORY: i64 = -2;
    pub const INVALID_ADDRESS: i64 = -3;
    pub const NOT_OWNER: i64 = -4;
    pub const NO_CHILDREN: i64 = -5;
    pub const HANDLE_NOT_FOUND: i64 = -6;
    pub const NOT_QUIESCENT: i64 = -7;
    pub const UNRECOVERABLE: i64 = -8;
    /// A negative length or tick count, an unknown terminal or syscall.
    pub const INVALID_ARGUMENT: i64 = -9;
}
