//! Round-robin scheduling with an idle fallback.
//!
//! The ready queue is strict FIFO. On every clock tick delayed processes
//! count down, and the running process goes to the back of the queue if
//! anything else is ready. Idle never enters the queue: it is picked only
//! when the queue is empty and gives way on the next tick that finds work.

use crate::process::{ProcessState, ProcessTable};
use kernel_sync::{BlockReason, Pid, Scheduler};
use log::{debug, trace};

impl ProcessTable {
    /// The process to run next: the head of the ready queue, or idle.
    pub(crate) fn pick_next(&mut self) -> Pid {
        self.ready.pop_front().unwrap_or(self.idle)
    }

    /// Clock tick bookkeeping. Returns whether the running process should
    /// give up the CPU.
    pub(crate) fn preempt(&mut self) -> bool {
        self.tick_delays();
        if self.ready.is_empty() {
            return false;
        }
        let me = self.running;
        if me != self.idle {
            self.current_mut().state = ProcessState::Ready;
            self.ready.push_back(me);
        }
        debug!("preempting {me:?}");
        true
    }

    /// Puts the running process on the delay list for `ticks` ticks.
    pub(crate) fn delay_running(&mut self, ticks: u64) {
        let me = self.running;
        self.delayed.push(me);
        self.park(BlockReason::Delay);
        self.current_mut().state = ProcessState::Delayed { remaining: ticks };
    }

    fn tick_delays(&mut self) {
        let mut expired = alloc::vec::Vec::new();
        for &pid in &self.delayed {
            if let Some(pcb) = self.pcbs.get_mut(&pid)
                && let ProcessState::Delayed { remaining } = &mut pcb.state
            {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    expired.push(pid);
                }
            }
        }
        for pid in expired {
            self.delayed.retain(|&p| p != pid);
            trace!("{pid:?} delay expired");
            self.make_ready(pid);
        }
    }
}
