use alloc::collections::VecDeque;
use alloc::vec::Vec;
use kernel_machine::UserContext;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{BlockReason, CvarWait, Handle, Pid};
use kernel_vmem::{KernelStackTable, UserAddressSpace};

/// Where a process is in its life.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked(BlockReason),
    /// On the delay list with `remaining` ticks to go.
    Delayed { remaining: u64 },
    /// Terminated, waiting to be collected.
    Defunct { status: i64 },
}

/// A syscall that blocked, with everything needed to pick it up again.
///
/// Data a writer copied in before blocking travels with the call so the
/// caller's buffer is read exactly once.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PendingCall {
    /// Fork as seen by the new child the first time it runs.
    Fork { child: Pid },
    Wait { status: VirtualAddress },
    Delay,
    TtyRead {
        tty: usize,
        buf: VirtualAddress,
        len: usize,
    },
    TtyWrite {
        tty: usize,
        data: Vec<u8>,
        sent: usize,
    },
    PipeRead {
        pipe: Handle,
        buf: VirtualAddress,
        len: usize,
    },
    PipeWrite {
        pipe: Handle,
        data: Vec<u8>,
        done: usize,
    },
    LockAcquire { lock: Handle },
    CvarWait {
        cvar: Handle,
        lock: Handle,
        stage: CvarWait,
    },
}

/// The saved kernel continuation of a process that is not running.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum KernelContext {
    /// Left the kernel normally; resumes in user mode.
    #[default]
    User,
    /// Suspended inside a syscall.
    Syscall(PendingCall),
    /// Never resumes.
    Exited,
}

/// Process control block.
#[derive(Debug)]
pub struct Pcb {
    pid: Pid,
    pub(crate) parent: Option<Pid>,
    pub(crate) alive: Vec<Pid>,
    pub(crate) defunct: VecDeque<Pid>,
    pub(crate) space: UserAddressSpace,
    pub(crate) kstack: KernelStackTable,
    pub(crate) user: UserContext,
    pub(crate) kernel: KernelContext,
    pub(crate) state: ProcessState,
}

impl Pcb {
    /// A process with nothing mapped and no kernel stack.
    pub(crate) fn new(pid: Pid, parent: Option<Pid>) -> Self {
        Self {
            pid,
            parent,
            alive: Vec::new(),
            defunct: VecDeque::new(),
            space: UserAddressSpace::new(),
            kstack: KernelStackTable::new(),
            user: UserContext::default(),
            kernel: KernelContext::User,
            state: ProcessState::Ready,
        }
    }

    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub const fn parent(&self) -> Option<Pid> {
        self.parent
    }

    #[must_use]
    pub fn alive_children(&self) -> &[Pid] {
        &self.alive
    }

    /// Children that exited and have not been waited for, oldest first.
    pub fn defunct_children(&self) -> impl Iterator<Item = Pid> + '_ {
        self.defunct.iter().copied()
    }

    #[must_use]
    pub const fn space(&self) -> &UserAddressSpace {
        &self.space
    }

    #[must_use]
    pub const fn kernel_stack(&self) -> &KernelStackTable {
        &self.kstack
    }

    /// User registers as of the last trap (or as they will be restored).
    #[must_use]
    pub const fn user_context(&self) -> &UserContext {
        &self.user
    }

    #[must_use]
    pub const fn kernel_context(&self) -> &KernelContext {
        &self.kernel
    }

    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// The exit status, once terminated.
    #[must_use]
    pub const fn exit_status(&self) -> Option<i64> {
        match self.state {
            ProcessState::Defunct { status } => Some(status),
            _ => None,
        }
    }
}
