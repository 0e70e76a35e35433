//! Terminal input and output queues.
//!
//! Output goes out one line-sized chunk at a time: a writer stages a chunk,
//! starts the transmitter and waits at the front of the output queue for the
//! completion trap. Input lands in a buffer on each receive trap and wakes
//! every reader.

use crate::SyncError;
use crate::ring_buffer::RingBuffer;
use crate::wait_queue::{BlockReason, Scheduler, WaitQueue};
use alloc::vec;
use alloc::vec::Vec;
use core::task::Poll;
use kernel_info::memory::{NUM_TERMINALS, TERMINAL_MAX_LINE};
use kernel_machine::Machine;
use log::trace;

#[derive(Debug)]
struct Terminal {
    input: RingBuffer,
    output: RingBuffer,
    transmitting: bool,
    readers: WaitQueue,
    writers: WaitQueue,
    landing: Vec<u8>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            input: RingBuffer::new(TERMINAL_MAX_LINE),
            output: RingBuffer::new(TERMINAL_MAX_LINE),
            transmitting: false,
            readers: WaitQueue::new(),
            writers: WaitQueue::new(),
            landing: vec![0; TERMINAL_MAX_LINE],
        }
    }
}

/// The queues of every attached terminal.
#[derive(Debug)]
pub struct Terminals {
    ttys: Vec<Terminal>,
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminals {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttys: (0..NUM_TERMINALS).map(|_| Terminal::new()).collect(),
        }
    }

    fn get_mut(&mut self, tty: usize) -> Result<&mut Terminal, SyncError> {
        self.ttys.get_mut(tty).ok_or(SyncError::InvalidTerminal(tty))
    }

    /// Whether terminal `tty` has a chunk in flight.
    #[must_use]
    pub fn is_transmitting(&self, tty: usize) -> bool {
        self.ttys.get(tty).is_some_and(|t| t.transmitting)
    }

    /// Bytes received on `tty` and not yet read.
    #[must_use]
    pub fn buffered_input(&self, tty: usize) -> usize {
        self.ttys.get(tty).map_or(0, |t| t.input.len())
    }

    /// Processes blocked writing to `tty`, next to be woken first.
    #[must_use]
    pub fn writers(&self, tty: usize) -> Option<&WaitQueue> {
        self.ttys.get(tty).map(|t| &t.writers)
    }

    /// Processes blocked reading from `tty`.
    #[must_use]
    pub fn readers(&self, tty: usize) -> Option<&WaitQueue> {
        self.ttys.get(tty).map(|t| &t.readers)
    }

    /// Transmits `data`, one chunk per completion trap.
    ///
    /// `sent` counts the bytes handed to the transmitter so far; it starts
    /// at zero and is carried between calls. A caller that finds the
    /// transmitter busy queues at the front, so the newest writer goes next.
    ///
    /// # Errors
    /// [`SyncError::InvalidTerminal`] for an unknown `tty`.
    pub fn write<M: Machine, S: Scheduler + ?Sized>(
        &mut self,
        tty: usize,
        machine: &mut M,
        sched: &mut S,
        data: &[u8],
        sent: &mut usize,
    ) -> Result<Poll<usize>, SyncError> {
        let t = self.get_mut(tty)?;

        if *sent < data.len() {
            if !t.transmitting {
                t.output.reset();
                *sent += t.output.write(&data[*sent..]);
                t.transmitting = true;
                let (chunk, _) = t.output.as_slices();
                trace!("tty{tty}: transmitting {} bytes", chunk.len());
                machine.tty_transmit(tty, chunk);
            }
            sched.block_front(&mut t.writers, BlockReason::TtyWrite(tty));
            return Ok(Poll::Pending);
        }

        sched.unblock_head(&mut t.writers);
        Ok(Poll::Ready(data.len()))
    }

    /// Handles the transmit-complete trap for `tty`.
    ///
    /// # Errors
    /// [`SyncError::InvalidTerminal`] for an unknown `tty`.
    pub fn transmit_complete<S: Scheduler + ?Sized>(
        &mut self,
        tty: usize,
        sched: &mut S,
    ) -> Result<(), SyncError> {
        let t = self.get_mut(tty)?;
        t.output.reset();
        t.transmitting = false;
        sched.unblock_head(&mut t.writers);
        Ok(())
    }

    /// Reads buffered input, up to `buf.len()`, blocking while there is none.
    ///
    /// # Errors
    /// [`SyncError::InvalidTerminal`] for an unknown `tty`.
    pub fn read<S: Scheduler + ?Sized>(
        &mut self,
        tty: usize,
        sched: &mut S,
        buf: &mut [u8],
    ) -> Result<Poll<usize>, SyncError> {
        let t = self.get_mut(tty)?;
        if buf.is_empty() {
            return Ok(Poll::Ready(0));
        }
        match t.input.read(buf) {
            0 => {
                sched.block(&mut t.readers, BlockReason::TtyRead(tty));
                Ok(Poll::Pending)
            }
            n => Ok(Poll::Ready(n)),
        }
    }

    /// Handles the receive trap for `tty`: pulls the line from the hardware
    /// and wakes every reader if anything was buffered. Input beyond the
    /// buffer's free space is dropped.
    ///
    /// # Errors
    /// [`SyncError::InvalidTerminal`] for an unknown `tty`.
    pub fn receive<M: Machine, S: Scheduler + ?Sized>(
        &mut self,
        tty: usize,
        machine: &mut M,
        sched: &mut S,
    ) -> Result<usize, SyncError> {
        let t = self.get_mut(tty)?;
        let arrived = machine.tty_receive(tty, &mut t.landing);
        let kept = t.input.write(&t.landing[..arrived]);
        if kept < arrived {
            log::warn!("tty{tty}: input buffer full, dropped {} bytes", arrived - kept);
        }
        if kept > 0 {
            sched.unblock_all(&mut t.readers);
        }
        Ok(kept)
    }
}
