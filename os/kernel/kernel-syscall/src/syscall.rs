use kernel_machine::UserContext;
use kernel_memory_addresses::VirtualAddress;

/// Syscall numbers, as placed in the trap code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u64)]
pub enum Sysno {
    Fork = 1,
    Exec = 2,
    Exit = 3,
    Wait = 4,
    GetPid = 5,
    Brk = 6,
    Delay = 7,
    TtyRead = 21,
    TtyWrite = 22,
    PipeInit = 31,
    PipeRead = 32,
    PipeWrite = 33,
    LockInit = 41,
    LockAcquire = 42,
    LockRelease = 43,
    CvarInit = 51,
    CvarSignal = 52,
    CvarBroadcast = 53,
    CvarWait = 54,
    Reclaim = 61,
}

impl TryFrom<u64> for Sysno {
    type Error = DecodeError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Fork,
            2 => Self::Exec,
            3 => Self::Exit,
            4 => Self::Wait,
            5 => Self::GetPid,
            6 => Self::Brk,
            7 => Self::Delay,
            21 => Self::TtyRead,
            22 => Self::TtyWrite,
            31 => Self::PipeInit,
            32 => Self::PipeRead,
            33 => Self::PipeWrite,
            41 => Self::LockInit,
            42 => Self::LockAcquire,
            43 => Self::LockRelease,
            51 => Self::CvarInit,
            52 => Self::CvarSignal,
            53 => Self::CvarBroadcast,
            54 => Self::CvarWait,
            61 => Self::Reclaim,
            _ => return Err(DecodeError::UnknownSyscall(code)),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown syscall number {0}")]
    UnknownSyscall(u64),
}

/// A decoded syscall with its arguments.
///
/// Lengths, tick counts and exit statuses are signed as the caller passed
/// them; range checks are the kernel's business. Object ids are the raw
/// handle values.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Syscall {
    Fork,
    Exec {
        file: VirtualAddress,
        argv: VirtualAddress,
    },
    Exit {
        status: i64,
    },
    Wait {
        status: VirtualAddress,
    },
    GetPid,
    Brk {
        addr: VirtualAddress,
    },
    Delay {
        ticks: i64,
    },
    TtyRead {
        tty: u64,
        buf: VirtualAddress,
        len: i64,
    },
    TtyWrite {
        tty: u64,
        buf: VirtualAddress,
        len: i64,
    },
    PipeInit {
        id_out: VirtualAddress,
    },
    PipeRead {
        pipe: u64,
        buf: VirtualAddress,
        len: i64,
    },
    PipeWrite {
        pipe: u64,
        buf: VirtualAddress,
        len: i64,
    },
    LockInit {
        id_out: VirtualAddress,
    },
    LockAcquire {
        lock: u64,
    },
    LockRelease {
        lock: u64,
    },
    CvarInit {
        id_out: VirtualAddress,
    },
    CvarSignal {
        cvar: u64,
    },
    CvarBroadcast {
        cvar: u64,
    },
    CvarWait {
        cvar: u64,
        lock: u64,
    },
    Reclaim {
        id: u64,
    },
}

#[allow(clippy::cast_possible_wrap)]
const fn signed(raw: u64) -> i64 {
    raw as i64
}

#[allow(clippy::cast_sign_loss)]
const fn unsigned(value: i64) -> u64 {
    value as u64
}

impl Syscall {
    /// Reads the syscall the trapping process asked for.
    ///
    /// # Errors
    /// [`DecodeError::UnknownSyscall`] if the trap code is not a syscall
    /// number.
    pub fn decode(ctx: &UserContext) -> Result<Self, DecodeError> {
        let [a, b, c, ..] = ctx.regs;
        let va = VirtualAddress::new;
        Ok(match Sysno::try_from(ctx.code)? {
            Sysno::Fork => Self::Fork,
            Sysno::Exec => Self::Exec {
                file: va(a),
                argv: va(b),
            },
            Sysno::Exit => Self::Exit { status: signed(a) },
            Sysno::Wait => Self::Wait { status: va(a) },
            Sysno::GetPid => Self::GetPid,
            Sysno::Brk => Self::Brk { addr: va(a) },
            Sysno::Delay => Self::Delay { ticks: signed(a) },
            Sysno::TtyRead => Self::TtyRead {
                tty: a,
                buf: va(b),
                len: signed(c),
            },
            Sysno::TtyWrite => Self::TtyWrite {
                tty: a,
                buf: va(b),
                len: signed(c),
            },
            Sysno::PipeInit => Self::PipeInit { id_out: va(a) },
            Sysno::PipeRead => Self::PipeRead {
                pipe: a,
                buf: va(b),
                len: signed(c),
            },
            Sysno::PipeWrite => Self::PipeWrite {
                pipe: a,
                buf: va(b),
                len: signed(c),
            },
            Sysno::LockInit => Self::LockInit { id_out: va(a) },
            Sysno::LockAcquire => Self::LockAcquire { lock: a },
            Sysno::LockRelease => Self::LockRelease { lock: a },
            Sysno::CvarInit => Self::CvarInit { id_out: va(a) },
            Sysno::CvarSignal => Self::CvarSignal { cvar: a },
            Sysno::CvarBroadcast => Self::CvarBroadcast { cvar: a },
            Sysno::CvarWait => Self::CvarWait { cvar: a, lock: b },
            Sysno::Reclaim => Self::Reclaim { id: a },
        })
    }

    #[must_use]
    pub const fn sysno(&self) -> Sysno {
        match self {
            Self::Fork => Sysno::Fork,
            Self::Exec { .. } => Sysno::Exec,
            Self::Exit { .. } => Sysno::Exit,
            Self::Wait { .. } => Sysno::Wait,
            Self::GetPid => Sysno::GetPid,
            Self::Brk { .. } => Sysno::Brk,
            Self::Delay { .. } => Sysno::Delay,
            Self::TtyRead { .. } => Sysno::TtyRead,
            Self::TtyWrite { .. } => Sysno::TtyWrite,
            Self::PipeInit { .. } => Sysno::PipeInit,
            Self::PipeRead { .. } => Sysno::PipeRead,
            Self::PipeWrite { .. } => Sysno::PipeWrite,
            Self::LockInit { .. } => Sysno::LockInit,
            Self::LockAcquire { .. } => Sysno::LockAcquire,
            Self::LockRelease { .. } => Sysno::LockRelease,
            Self::CvarInit { .. } => Sysno::CvarInit,
            Self::CvarSignal { .. } => Sysno::CvarSignal,
            Self::CvarBroadcast { .. } => Sysno::CvarBroadcast,
            Self::CvarWait { .. } => Sysno::CvarWait,
            Self::Reclaim { .. } => Sysno::Reclaim,
        }
    }

    /// The user-side half of the ABI: sets up `ctx` as the library stub
    /// would before trapping.
    pub fn encode_into(&self, ctx: &mut UserContext) {
        let args: [u64; 3] = match *self {
            Self::Fork | Self::GetPid => [0; 3],
            Self::Exec { file, argv } => [file.as_u64(), argv.as_u64(), 0],
            Self::Exit { status } => [unsigned(status), 0, 0],
            Self::Wait { status } => [status.as_u64(), 0, 0],
            Self::Brk { addr } => [addr.as_u64(), 0, 0],
            Self::Delay { ticks } => [unsigned(ticks), 0, 0],
            Self::TtyRead { tty, buf, len } | Self::TtyWrite { tty, buf, len } => {
                [tty, buf.as_u64(), unsigned(len)]
            }
            Self::PipeRead { pipe, buf, len } | Self::PipeWrite { pipe, buf, len } => {
                [pipe, buf.as_u64(), unsigned(len)]
            }
            Self::PipeInit { id_out } | Self::LockInit { id_out } | Self::CvarInit { id_out } => {
                [id_out.as_u64(), 0, 0]
            }
            Self::LockAcquire { lock: id }
            | Self::LockRelease { lock: id }
            | Self::CvarSignal { cvar: id }
            | Self::CvarBroadcast { cvar: id }
            | Self::Reclaim { id } => [id, 0, 0],
            Self::CvarWait { cvar, lock } => [cvar, lock, 0],
        };
        ctx.vector = kernel_machine::TrapVector::Kernel;
        ctx.code = self.sysno() as u64;
        ctx.regs[..3].copy_from_slice(&args);
    }
}
