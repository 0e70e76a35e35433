//! # Kernel Boot Information

use alloc::string::String;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use log::LevelFilter;

use crate::memory::{REGION0_LIMIT, SCRATCH_PAGE};

/// Everything the kernel needs to know when the machine hands it control.
///
/// The values mirror what a bootloader would pass on the command line and in
/// registers: how much physical memory exists, where the kernel image ends,
/// which program to start as the root process, and how chatty the log is.
#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Size of physical memory in bytes. Must be a multiple of the page size
    /// and large enough to back the kernel stack window identity mapping.
    pub pmem_size: u64,

    /// First address after kernel text. Pages below are mapped read+execute.
    pub kernel_data_start: VirtualAddress,

    /// Initial kernel break. Pages in `[kernel_data_start, kernel_brk)` are
    /// mapped read+write.
    pub kernel_brk: VirtualAddress,

    /// Name of the program loaded into the root process.
    pub init_program: String,

    /// Argument vector for the root process (conventionally starting with the
    /// program name).
    pub init_args: Vec<String>,

    /// Entry point of the idle loop. It lives in kernel text but runs in user
    /// mode on its own one-page user stack.
    pub idle_pc: VirtualAddress,

    /// Install the kernel's trace logger at this level during boot.
    pub log_level: Option<LevelFilter>,
}

impl BootConfig {
    /// Number of physical frames described by [`pmem_size`](Self::pmem_size).
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.pmem_size / PAGE_SIZE
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns the first [`BootConfigError`] found.
    pub fn validate(&self) -> Result<(), BootConfigError> {
        if self.pmem_size == 0 || !self.pmem_size.is_multiple_of(PAGE_SIZE) {
            return Err(BootConfigError::UnalignedMemory(self.pmem_size));
        }
        if self.pmem_size <= REGION0_LIMIT {
            return Err(BootConfigError::TooLittleMemory(self.pmem_size));
        }
        let data = self.kernel_data_start.as_u64();
        let brk = self.kernel_brk.as_u64();
        if data > brk || brk > SCRATCH_PAGE {
            return Err(BootConfigError::BadKernelImage {
                data_start: self.kernel_data_start,
                brk: self.kernel_brk,
            });
        }
        if self.init_program.is_empty() {
            return Err(BootConfigError::NoInitProgram);
        }
        Ok(())
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            pmem_size: 4 * 1024 * 1024,
            kernel_data_start: VirtualAddress::new(0x8000),
            kernel_brk: VirtualAddress::new(0x2_0000),
            init_program: String::from("init"),
            init_args: alloc::vec![String::from("init")],
            idle_pc: VirtualAddress::new(0x1000),
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BootConfigError {
    #[error("physical memory size {0:#x} is not a non-zero multiple of the page size")]
    UnalignedMemory(u64),
    #[error("physical memory size {0:#x} leaves no frames beyond the identity-mapped kernel region")]
    TooLittleMemory(u64),
    #[error("kernel image layout is inconsistent (data start {data_start}, brk {brk})")]
    BadKernelImage {
        data_start: VirtualAddress,
        brk: VirtualAddress,
    },
    #[error("no init program configured")]
    NoInitProgram,
}
