//! In-memory implementation of [`Machine`].

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::{
    KERNEL_STACK_PAGES, NUM_TERMINALS, REGION0_LIMIT, Region, kernel_stack_base_page,
};
use kernel_memory_addresses::{PhysicalAddress, VirtualPage};
use log::{trace, warn};

use crate::{BusError, Machine, Register, TlbFlush, TlbFlushCommand, UserContext};

/// One terminal attached to the simulated machine.
#[derive(Debug, Default, Clone)]
pub struct SimulatedTerminal {
    /// Lines typed by the operator, oldest first.
    input: VecDeque<Vec<u8>>,
    /// Bytes handed to the transmitter but not yet completed.
    in_flight: Option<Vec<u8>>,
    /// Everything transmitted so far.
    output: Vec<u8>,
}

impl SimulatedTerminal {
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    #[must_use]
    pub const fn is_transmitting(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn pending_lines(&self) -> usize {
        self.input.len()
    }
}

/// A machine that exists only in memory.
///
/// Physical memory is a flat byte vector, the TLB is a map from virtual page
/// number to raw entry, and terminals are queues. Tests drive it by typing
/// lines ([`type_line`](Self::type_line)), completing transmissions
/// ([`complete_transmit`](Self::complete_transmit)) and then raising the
/// matching trap on the kernel.
#[derive(Debug)]
pub struct SimulatedMachine {
    registers: [u64; Register::COUNT],
    memory: Vec<u8>,
    tlb: BTreeMap<VirtualPage, u64>,
    terminals: Vec<SimulatedTerminal>,
    context: UserContext,
    halted: bool,
    flushes: Vec<TlbFlush>,
}

impl SimulatedMachine {
    /// Creates a machine with `pmem_size` bytes of zeroed physical memory.
    #[must_use]
    pub fn new(pmem_size: u64) -> Self {
        let len = usize::try_from(pmem_size).unwrap_or(usize::MAX);
        Self {
            registers: [0; Register::COUNT],
            memory: vec![0; len],
            tlb: BTreeMap::new(),
            terminals: vec![SimulatedTerminal::default(); NUM_TERMINALS],
            context: UserContext::default(),
            halted: false,
            flushes: Vec::new(),
        }
    }

    /// Queues a line of input on terminal `tty`. The caller raises the
    /// receive trap afterwards.
    pub fn type_line(&mut self, tty: usize, line: &[u8]) {
        if let Some(t) = self.terminals.get_mut(tty) {
            t.input.push_back(line.to_vec());
        }
    }

    /// Finishes the transmission in flight on `tty`, returning its bytes.
    /// The caller raises the transmit trap afterwards.
    pub fn complete_transmit(&mut self, tty: usize) -> Option<Vec<u8>> {
        let t = self.terminals.get_mut(tty)?;
        let data = t.in_flight.take()?;
        t.output.extend_from_slice(&data);
        Some(data)
    }

    #[must_use]
    pub fn terminal(&self, tty: usize) -> Option<&SimulatedTerminal> {
        self.terminals.get(tty)
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Every flush command written so far, oldest first.
    #[must_use]
    pub fn tlb_flushes(&self) -> &[TlbFlush] {
        &self.flushes
    }

    /// Number of cached translations.
    #[must_use]
    pub fn tlb_len(&self) -> usize {
        self.tlb.len()
    }

    fn range(&self, addr: PhysicalAddress, len: usize) -> Result<core::ops::Range<usize>, BusError> {
        let err = BusError { addr, len };
        let start = usize::try_from(addr.as_u64()).map_err(|_| err)?;
        let end = start.checked_add(len).ok_or(err)?;
        if end > self.memory.len() {
            return Err(err);
        }
        Ok(start..end)
    }

    fn apply_flush(&mut self, flush: TlbFlush) {
        match flush {
            TlbFlush::Page(page) => {
                self.tlb.remove(&page);
            }
            TlbFlush::All => self.tlb.clear(),
            TlbFlush::Region0 => self
                .tlb
                .retain(|page, _| page.base().as_u64() >= REGION0_LIMIT),
            TlbFlush::Region1 => self
                .tlb
                .retain(|page, _| Region::of(page.base()) != Some(Region::User)),
            TlbFlush::KernelStack => {
                let mut page = kernel_stack_base_page();
                for _ in 0..KERNEL_STACK_PAGES {
                    self.tlb.remove(&page);
                    page = page.next();
                }
            }
        }
        self.flushes.push(flush);
    }
}

impl Machine for SimulatedMachine {
    fn read_register(&self, reg: Register) -> u64 {
        match reg {
            Register::TlbFlush => 0,
            _ => self.registers[reg.index()],
        }
    }

    fn write_register(&mut self, reg: Register, value: u64) {
        if reg == Register::TlbFlush {
            match TlbFlushCommand::from_bits(value).decode() {
                Some(flush) => self.apply_flush(flush),
                None => warn!("Ignoring reserved TLB flush command {value:#x}"),
            }
            return;
        }
        trace!("{reg:?} <- {value:#x}");
        self.registers[reg.index()] = value;
    }

    fn tlb_lookup(&self, page: VirtualPage) -> Option<u64> {
        self.tlb.get(&page).copied()
    }

    fn tlb_fill(&mut self, page: VirtualPage, entry: u64) {
        self.tlb.insert(page, entry);
    }

    fn pmem_size(&self) -> u64 {
        self.memory.len() as u64
    }

    fn phys_read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> Result<(), BusError> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn phys_write(&mut self, addr: PhysicalAddress, data: &[u8]) -> Result<(), BusError> {
        let range = self.range(addr, data.len())?;
        self.memory[range].copy_from_slice(data);
        Ok(())
    }

    fn user_context(&self) -> &UserContext {
        &self.context
    }

    fn user_context_mut(&mut self) -> &mut UserContext {
        &mut self.context
    }

    fn tty_transmit(&mut self, tty: usize, data: &[u8]) {
        let Some(t) = self.terminals.get_mut(tty) else {
            warn!("Transmit on nonexistent terminal {tty}");
            return;
        };
        if t.in_flight.is_some() {
            warn!("Terminal {tty} is already transmitting; the earlier chunk is lost");
        }
        t.in_flight = Some(data.to_vec());
    }

    fn tty_receive(&mut self, tty: usize, buf: &mut [u8]) -> usize {
        let Some(line) = self.terminals.get_mut(tty).and_then(|t| t.input.pop_front()) else {
            return 0;
        };
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line[..n]);
        n
    }

    fn halt(&mut self) {
        self.halted = true;
    }
}
