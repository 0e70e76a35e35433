//! Program loading.
//!
//! Exec and boot hand the loader an [`ImageBuilder`] over the target
//! process' address space and registers. The loader decides what goes
//! where; the builder does the mapping, copying and argument stack layout.
//!
//! A loader must settle whether it can succeed before it calls
//! [`ImageBuilder::clear`]. Failing before that leaves the old image
//! intact ([`LoadFailure::Error`]); failing after it leaves the process
//! with nothing to return to ([`LoadFailure::Kill`]).

use crate::memory::Memory;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use kernel_alloc::vmm::VmmError;
use kernel_info::memory::{INITIAL_STACK_PAGES, PAGE_SIZE, REGION1_BASE, REGION1_LIMIT, REGION1_PAGES};
use kernel_machine::{Machine, UserContext};
use kernel_memory_addresses::{VirtualAddress, VirtualPage};
use kernel_vmem::{Protection, UserAddressSpace, VirtualMemory};
use log::{debug, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("no such program")]
    NotFound,
    #[error("program does not fit in the user region")]
    TooBig,
    #[error("not enough free frames for the program")]
    OutOfMemory,
    #[error(transparent)]
    Memory(#[from] VmmError),
}

/// Why a load did not produce a runnable image.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoadFailure {
    /// Nothing was touched; the caller keeps running its old program.
    #[error("load refused: {0}")]
    Error(LoadError),
    /// The old image is already gone.
    #[error("load failed after clearing the old image: {0}")]
    Kill(LoadError),
}

/// Replaces the contents of a process' address space with a program.
pub trait ProgramLoader {
    /// Loads `name` with argument vector `args` through `image`.
    ///
    /// # Errors
    /// See [`LoadFailure`].
    fn load<M: Machine>(
        &mut self,
        name: &[u8],
        args: &[Vec<u8>],
        image: &mut ImageBuilder<'_, M>,
    ) -> Result<(), LoadFailure>;
}

/// Write access to the address space and registers of the process being
/// loaded, which must be the running one.
pub struct ImageBuilder<'a, M: Machine> {
    machine: &'a mut M,
    memory: &'a mut Memory,
    space: &'a mut UserAddressSpace,
    user: &'a mut UserContext,
}

impl<'a, M: Machine> ImageBuilder<'a, M> {
    pub(crate) const fn new(
        machine: &'a mut M,
        memory: &'a mut Memory,
        space: &'a mut UserAddressSpace,
        user: &'a mut UserContext,
    ) -> Self {
        Self {
            machine,
            memory,
            space,
            user,
        }
    }

    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.memory.frames.available()
    }

    /// Frames held by the current image, all of which [`clear`](Self::clear)
    /// gives back.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.space.size()
    }

    /// Pages [`build_stack`](Self::build_stack) will map for `args`.
    #[must_use]
    pub fn stack_pages(&self, args: &[Vec<u8>]) -> u64 {
        let (strings, words) = stack_layout(args);
        (strings.next_multiple_of(8) + words * 8)
            .div_ceil(PAGE_SIZE)
            .max(INITIAL_STACK_PAGES)
    }

    /// Discards the current image and resets the registers.
    pub fn clear(&mut self) {
        self.memory
            .vmm(&mut *self.machine)
            .destroy_address_space(&mut *self.space);
        self.space.copy_bounds_from(&UserAddressSpace::new());
        *self.user = UserContext::default();
    }

    /// Maps fresh zeroed pages covering `len` bytes from `start`.
    ///
    /// # Errors
    /// [`LoadError::Memory`] if a page is outside region 1 or no frame is
    /// left.
    pub fn map(&mut self, start: VirtualAddress, len: u64, prot: Protection) -> Result<(), LoadError> {
        if len == 0 {
            return Ok(());
        }
        let last = start
            .checked_add(len - 1)
            .ok_or(LoadError::Memory(VmmError::InvalidAddress(start)))?;
        let mut vmm = self.memory.vmm(&mut *self.machine);
        for page in start.page().number()..=last.page().number() {
            vmm.map_user_page(&mut *self.space, VirtualPage::from_number(page), prot)?;
        }
        Ok(())
    }

    /// Copies `data` into the image at `at`, regardless of protection.
    ///
    /// # Errors
    /// [`LoadError::Memory`] if part of the range is not mapped.
    pub fn write(&mut self, at: VirtualAddress, data: &[u8]) -> Result<(), LoadError> {
        VirtualMemory::new(&mut *self.machine, self.memory.kernel.table(), Some(&*self.space))
            .write(at, data)
            .map_err(|e| LoadError::Memory(e.into()))
    }

    /// Marks where static data ends; the heap starts empty there.
    pub const fn set_data_end(&mut self, end: VirtualAddress) {
        self.space.set_data_end(end);
        self.space.set_brk(end);
    }

    /// Maps the initial stack at the top of region 1 and lays out the
    /// argument strings, the null-terminated argument vector and the
    /// argument count, leaving `sp` at the count and the count and vector
    /// in the first two registers.
    ///
    /// # Errors
    /// [`LoadError::TooBig`] if the stack would not leave a guard page
    /// above the heap, or a mapping failure.
    pub fn build_stack(&mut self, args: &[Vec<u8>]) -> Result<(), LoadError> {
        let pages = self.stack_pages(args);
        let low = VirtualAddress::new(REGION1_LIMIT - pages * PAGE_SIZE);
        if low.as_u64() < self.space.brk().align_up().as_u64() + PAGE_SIZE {
            return Err(LoadError::TooBig);
        }
        self.map(low, pages * PAGE_SIZE, Protection::READ_WRITE)?;
        self.space.set_stack_low(low);

        let (strings, _) = stack_layout(args);
        let strings_at = REGION1_LIMIT - strings;
        let mut blob = Vec::with_capacity(usize::try_from(strings).unwrap_or_default());
        let mut argv = Vec::with_capacity(args.len() + 1);
        for arg in args {
            argv.push(strings_at + blob.len() as u64);
            blob.extend_from_slice(arg);
            blob.push(0);
        }
        argv.push(0);
        self.write(VirtualAddress::new(strings_at), &blob)?;

        let argv_at = (strings_at & !7) - argv.len() as u64 * 8;
        let words: Vec<u8> = argv.iter().flat_map(|p| p.to_le_bytes()).collect();
        self.write(VirtualAddress::new(argv_at), &words)?;

        let sp = VirtualAddress::new(argv_at - 8);
        let argc = args.len() as u64;
        self.write(sp, &argc.to_le_bytes())?;

        self.user.sp = sp;
        self.user.regs[0] = argc;
        self.user.regs[1] = argv_at;
        debug!("stack of {pages} pages, {argc} args, sp {sp}");
        Ok(())
    }

    pub const fn set_entry(&mut self, pc: VirtualAddress) {
        self.user.pc = pc;
    }
}

/// Bytes of argument strings (terminators included) and words of argc plus
/// the null-terminated vector.
fn stack_layout(args: &[Vec<u8>]) -> (u64, u64) {
    let strings = args.iter().map(|a| a.len() as u64 + 1).sum();
    (strings, args.len() as u64 + 2)
}

/// A program image: text, initialized data, zero-filled data and the entry
/// offset into the text.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Program {
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub bss: u64,
    pub entry: u64,
}

impl Program {
    #[must_use]
    pub fn new(text: Vec<u8>) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub const fn with_bss(mut self, bytes: u64) -> Self {
        self.bss = bytes;
        self
    }

    #[must_use]
    pub const fn with_entry(mut self, offset: u64) -> Self {
        self.entry = offset;
        self
    }
}

/// Programs held in memory, looked up by name.
///
/// Text is mapped read+execute at the bottom of region 1 and data plus bss
/// read+write right after it; the heap starts where they end.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: BTreeMap<Vec<u8>, Program>,
}

impl ProgramCatalog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            programs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, program: Program) -> Self {
        self.insert(name, program);
        self
    }

    pub fn insert(&mut self, name: &str, program: Program) {
        self.programs.insert(name.as_bytes().to_vec(), program);
    }

    #[must_use]
    pub fn get(&self, name: &[u8]) -> Option<&Program> {
        self.programs.get(name)
    }
}

impl ProgramLoader for ProgramCatalog {
    fn load<M: Machine>(
        &mut self,
        name: &[u8],
        args: &[Vec<u8>],
        image: &mut ImageBuilder<'_, M>,
    ) -> Result<(), LoadFailure> {
        let Some(program) = self.programs.get(name) else {
            warn!("No program named {:?}", alloc::string::String::from_utf8_lossy(name));
            return Err(LoadFailure::Error(LoadError::NotFound));
        };

        let text_len = (program.text.len() as u64).max(1);
        let data_len = program.data.len() as u64 + program.bss;
        let text_pages = text_len.div_ceil(PAGE_SIZE);
        let data_pages = data_len.div_ceil(PAGE_SIZE);
        let needed = text_pages + data_pages + image.stack_pages(args);
        if needed + 1 > REGION1_PAGES as u64 || program.entry >= text_len {
            return Err(LoadFailure::Error(LoadError::TooBig));
        }
        let available = (image.free_frames() + image.mapped_pages()) as u64;
        if needed > available {
            return Err(LoadFailure::Error(LoadError::OutOfMemory));
        }

        image.clear();
        let text = VirtualAddress::new(REGION1_BASE);
        let data = text + text_pages * PAGE_SIZE;
        image
            .map(text, text_len, Protection::READ_EXEC)
            .and_then(|()| image.write(text, &program.text))
            .and_then(|()| image.map(data, data_len, Protection::READ_WRITE))
            .and_then(|()| image.write(data, &program.data))
            .map_err(LoadFailure::Kill)?;
        image.set_data_end(data + data_len);
        image.build_stack(args).map_err(LoadFailure::Kill)?;
        image.set_entry(text + program.entry);
        Ok(())
    }
}
