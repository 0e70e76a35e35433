//! # Kernel synchronization and I/O substrate
//!
//! Pipes, locks, condition variables and terminal queues, all built on one
//! blocking primitive: a [`WaitQueue`] of pids plus the [`Scheduler`] that
//! owns their states.
//!
//! ## Restartable operations
//!
//! There is no kernel thread to suspend. An operation that has to wait
//! blocks the running process, returns [`Poll::Pending`](core::task::Poll)
//! and is simply called again once the process is dispatched after being
//! woken. Progress that must survive (bytes already written, stage of a
//! condition wait) lives in the caller, which passes it back in. Every
//! operation leaves its object consistent before it returns pending.
//!
//! Waking never runs anything. A woken process only becomes ready, which is
//! why locks and pipes count woken waiters that have not yet rechecked
//! ("unfulfilled") and refuse to be reclaimed until that count drains.
//!
//! ```rust
//! use core::task::Poll;
//! use kernel_sync::{BlockReason, Lock, Handle, Pid, Scheduler};
//!
//! struct Two { running: Pid, blocked: Option<Pid>, ready: Vec<Pid> }
//!
//! impl Scheduler for Two {
//!     fn running(&self) -> Pid { self.running }
//!     fn park(&mut self, _: BlockReason) { self.blocked = Some(self.running) }
//!     fn make_ready(&mut self, pid: Pid) { self.ready.push(pid) }
//! }
//!
//! let (a, b) = (Pid::new(1), Pid::new(2));
//! let mut s = Two { running: a, blocked: None, ready: Vec::new() };
//! let mut lock = Lock::new(Handle::new(0));
//!
//! assert_eq!(lock.acquire(&mut s, false), Poll::Ready(()));
//! s.running = b;
//! assert_eq!(lock.acquire(&mut s, false), Poll::Pending);
//! s.running = a;
//! lock.release(&mut s).unwrap();
//! assert_eq!(s.ready, [b]);
//! s.running = b;
//! assert_eq!(lock.acquire(&mut s, true), Poll::Ready(()));
//! assert_eq!(lock.owner(), Some(b));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod cvar;
mod error;
mod ids;
mod lock;
mod objects;
mod pipe;
mod ring_buffer;
#[cfg(test)]
mod testing;
mod tty;
mod wait_queue;

pub use cvar::{CondVar, CvarWait};
pub use error::SyncError;
pub use ids::{Handle, Pid};
pub use lock::Lock;
pub use objects::{ObjectKind, SyncObjects};
pub use pipe::Pipe;
pub use ring_buffer::RingBuffer;
pub use tty::Terminals;
pub use wait_queue::{BlockReason, Scheduler, WaitQueue};
