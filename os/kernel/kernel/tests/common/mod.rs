//! Boots a kernel on a simulated machine and plays user processes against it.

#![allow(dead_code)]

use kernel::{Kernel, Pid, Program, ProgramCatalog, SequentialPidAllocator, TrapExit};
use kernel_info::boot::BootConfig;
use kernel_info::memory::{PAGE_SIZE, REGION0_LIMIT, REGION1_BASE, SCRATCH_PAGE};
use kernel_machine::{Machine, SimulatedMachine, TrapVector};
use kernel_memory_addresses::VirtualAddress;
use kernel_syscall::Syscall;

/// Start of the zero-filled data every test program carries; handy for
/// buffers and output words.
pub const DATA: u64 = REGION1_BASE + PAGE_SIZE;

/// Pages of zero-filled data in the test programs.
pub const DATA_PAGES: u64 = 4;

pub type TestKernel = Kernel<SimulatedMachine, ProgramCatalog>;

pub fn va(addr: u64) -> VirtualAddress {
    VirtualAddress::new(addr)
}

pub fn catalog() -> ProgramCatalog {
    ProgramCatalog::new()
        .with(
            "init",
            Program::new(vec![0x90; 64]).with_bss(DATA_PAGES * PAGE_SIZE),
        )
        .with(
            "worker",
            Program::new(vec![0xcc; 32])
                .with_data(b"worker data".to_vec())
                .with_bss(DATA_PAGES * PAGE_SIZE)
                .with_entry(16),
        )
}

/// A machine with 64 frames beyond region 0 and a kernel heap reaching up
/// to the scratch page, so user memory runs out quickly.
pub fn small_machine() -> BootConfig {
    BootConfig {
        pmem_size: REGION0_LIMIT + 64 * PAGE_SIZE,
        kernel_brk: va(SCRATCH_PAGE),
        ..BootConfig::default()
    }
}

pub struct Harness {
    pub kernel: TestKernel,
}

impl Harness {
    pub fn boot() -> Self {
        Self::with_config(&BootConfig::default())
    }

    pub fn with_config(config: &BootConfig) -> Self {
        let machine = SimulatedMachine::new(config.pmem_size);
        let kernel = Kernel::boot(machine, config, catalog(), SequentialPidAllocator::new())
            .expect("boot failed");
        Self { kernel }
    }

    pub fn running(&self) -> Pid {
        self.kernel.running()
    }

    /// Traps into the kernel with `call` on behalf of the running process.
    pub fn syscall(&mut self, call: Syscall) -> TrapExit {
        call.encode_into(self.kernel.machine_mut().user_context_mut());
        self.kernel.handle_trap()
    }

    /// Issues `call` and returns its result, asserting the caller continues.
    pub fn call(&mut self, call: Syscall) -> i64 {
        let me = self.running();
        let exit = self.syscall(call);
        assert_eq!(exit, TrapExit::User(me), "{call:?} did not return to the caller");
        self.kernel.machine().user_context().return_value()
    }

    /// Issues `call` and asserts the caller was switched out.
    pub fn call_blocking(&mut self, call: Syscall) -> TrapExit {
        let me = self.running();
        let exit = self.syscall(call);
        assert_ne!(exit, TrapExit::User(me), "{call:?} did not block");
        exit
    }

    /// The return register `pid` will see when it next runs.
    pub fn result_of(&self, pid: Pid) -> i64 {
        self.kernel
            .process(pid)
            .expect("no such process")
            .user_context()
            .return_value()
    }

    /// Raises a hardware trap, leaving the registers alone.
    pub fn trap(&mut self, vector: TrapVector, code: u64, addr: u64) -> TrapExit {
        let ctx = self.kernel.machine_mut().user_context_mut();
        ctx.vector = vector;
        ctx.code = code;
        ctx.addr = va(addr);
        self.kernel.handle_trap()
    }

    pub fn tick(&mut self) -> TrapExit {
        self.trap(TrapVector::Clock, 0, 0)
    }

    /// Ticks until `pid` is running.
    pub fn run(&mut self, pid: Pid) {
        for _ in 0..64 {
            if self.running() == pid {
                return;
            }
            self.tick();
        }
        panic!("{pid:?} never got the CPU");
    }

    pub fn fork(&mut self) -> Pid {
        let child = self.call(Syscall::Fork);
        assert!(child > 0, "fork failed with {child}");
        Pid::new(child as u64)
    }

    pub fn poke(&mut self, addr: u64, data: &[u8]) {
        self.kernel.write_user(va(addr), data).expect("poke");
    }

    pub fn peek(&mut self, addr: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.kernel.read_user(va(addr), &mut buf).expect("peek");
        buf
    }

    pub fn peek_word(&mut self, addr: u64) -> u64 {
        let bytes = self.peek(addr, 8);
        u64::from_le_bytes(bytes.try_into().unwrap())
    }

    /// Writes a NUL-terminated string into the running process.
    pub fn put_str(&mut self, addr: u64, s: &str) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.poke(addr, &bytes);
    }
}
