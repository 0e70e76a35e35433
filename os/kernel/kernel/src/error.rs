use crate::loader::LoadError;
use kernel_alloc::vmm::VmmError;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{Handle, SyncError};
use kernel_syscall::{DecodeError, errno};
use kernel_vmem::AccessError;

/// Why a syscall failed, as reported to the calling process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid address {0}")]
    InvalidAddress(VirtualAddress),
    #[error("lock {0} is not held by the caller")]
    NotOwner(Handle),
    #[error("no children to wait for")]
    NoChildren,
    #[error("no object with handle {0}")]
    HandleNotFound(Handle),
    #[error("object {0} is still in use")]
    NotQuiescent(Handle),
    #[error("unrecoverable fault")]
    Unrecoverable,
    #[error("invalid argument")]
    InvalidArgument,
}

impl KernelError {
    /// The value placed in the caller's return register.
    #[must_use]
    pub const fn return_code(self) -> i64 {
        match self {
            Self::OutOfMemory => errno::OUT_OF_MEMORY,
            Self::InvalidAddress(_) => errno::INVALID_ADDRESS,
            Self::NotOwner(_) => errno::NOT_OWNER,
            Self::NoChildren => errno::NO_CHILDREN,
            Self::HandleNotFound(_) => errno::HANDLE_NOT_FOUND,
            Self::NotQuiescent(_) => errno::NOT_QUIESCENT,
            Self::Unrecoverable => errno::UNRECOVERABLE,
            Self::InvalidArgument => errno::INVALID_ARGUMENT,
        }
    }
}

impl From<AccessError> for KernelError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::OutOfRegion(addr)
            | AccessError::Unmapped(addr)
            | AccessError::Protection { addr, .. }
            | AccessError::Unterminated(addr) => Self::InvalidAddress(addr),
            AccessError::Bus(_) => Self::InvalidAddress(VirtualAddress::NULL),
        }
    }
}

impl From<VmmError> for KernelError {
    fn from(e: VmmError) -> Self {
        match e {
            VmmError::OutOfMemory => Self::OutOfMemory,
            VmmError::InvalidAddress(addr) | VmmError::StackCollision(addr) => {
                Self::InvalidAddress(addr)
            }
            VmmError::Access(e) => e.into(),
        }
    }
}

impl From<SyncError> for KernelError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotOwner(h) => Self::NotOwner(h),
            SyncError::NotQuiescent(h) => Self::NotQuiescent(h),
            SyncError::HandleNotFound(h) => Self::HandleNotFound(h),
            SyncError::InvalidTerminal(_) => Self::InvalidArgument,
        }
    }
}

impl From<DecodeError> for KernelError {
    fn from(_: DecodeError) -> Self {
        Self::InvalidArgument
    }
}

impl From<LoadError> for KernelError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NotFound | LoadError::TooBig => Self::InvalidArgument,
            LoadError::OutOfMemory => Self::OutOfMemory,
            LoadError::Memory(e) => e.into(),
        }
    }
}
