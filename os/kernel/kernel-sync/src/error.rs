use crate::ids::Handle;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("lock {0} is not held by the caller")]
    NotOwner(Handle),
    #[error("{0} still has owners, waiters or woken waiters")]
    NotQuiescent(Handle),
    #[error("no pipe, lock or condition variable with handle {0}")]
    HandleNotFound(Handle),
    #[error("no terminal {0}")]
    InvalidTerminal(usize),
}
