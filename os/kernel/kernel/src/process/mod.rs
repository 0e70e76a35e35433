//! Process control blocks and the table that owns them.

mod lifecycle;
mod pcb;
mod table;

pub use pcb::{KernelContext, Pcb, PendingCall, ProcessState};
pub use table::ProcessTable;
