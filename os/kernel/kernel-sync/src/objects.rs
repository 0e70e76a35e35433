use crate::SyncError;
use crate::cvar::CondVar;
use crate::ids::Handle;
use crate::lock::Lock;
use crate::pipe::Pipe;
use alloc::collections::BTreeMap;
use log::debug;

/// Every live pipe, lock and condition variable, by handle.
#[derive(Debug, Default)]
pub struct SyncObjects {
    next: u64,
    pipes: BTreeMap<Handle, Pipe>,
    locks: BTreeMap<Handle, Lock>,
    cvars: BTreeMap<Handle, CondVar>,
}

/// The kind of object a handle named when it was reclaimed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ObjectKind {
    Pipe,
    Lock,
    Cvar,
}

impl SyncObjects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn next_handle(&mut self) -> Handle {
        let handle = Handle::new(self.next);
        self.next += 1;
        handle
    }

    pub fn new_pipe(&mut self) -> Handle {
        let handle = self.next_handle();
        self.pipes.insert(handle, Pipe::new(handle));
        handle
    }

    pub fn new_lock(&mut self) -> Handle {
        let handle = self.next_handle();
        self.locks.insert(handle, Lock::new(handle));
        handle
    }

    pub fn new_cvar(&mut self) -> Handle {
        let handle = self.next_handle();
        self.cvars.insert(handle, CondVar::new(handle));
        handle
    }

    /// # Errors
    /// [`SyncError::HandleNotFound`] unless `handle` names a pipe.
    pub fn pipe_mut(&mut self, handle: Handle) -> Result<&mut Pipe, SyncError> {
        self.pipes
            .get_mut(&handle)
            .ok_or(SyncError::HandleNotFound(handle))
    }

    /// # Errors
    /// [`SyncError::HandleNotFound`] unless `handle` names a lock.
    pub fn lock_mut(&mut self, handle: Handle) -> Result<&mut Lock, SyncError> {
        self.locks
            .get_mut(&handle)
            .ok_or(SyncError::HandleNotFound(handle))
    }

    /// # Errors
    /// [`SyncError::HandleNotFound`] unless `handle` names a condition
    /// variable.
    pub fn cvar_mut(&mut self, handle: Handle) -> Result<&mut CondVar, SyncError> {
        self.cvars
            .get_mut(&handle)
            .ok_or(SyncError::HandleNotFound(handle))
    }

    /// A condition variable together with the lock it is waited on with.
    ///
    /// # Errors
    /// [`SyncError::HandleNotFound`] if either handle is unknown.
    pub fn cvar_and_lock_mut(
        &mut self,
        cvar: Handle,
        lock: Handle,
    ) -> Result<(&mut CondVar, &mut Lock), SyncError> {
        let c = self
            .cvars
            .get_mut(&cvar)
            .ok_or(SyncError::HandleNotFound(cvar))?;
        let l = self
            .locks
            .get_mut(&lock)
            .ok_or(SyncError::HandleNotFound(lock))?;
        Ok((c, l))
    }

    #[must_use]
    pub fn pipe(&self, handle: Handle) -> Option<&Pipe> {
        self.pipes.get(&handle)
    }

    #[must_use]
    pub fn lock(&self, handle: Handle) -> Option<&Lock> {
        self.locks.get(&handle)
    }

    #[must_use]
    pub fn cvar(&self, handle: Handle) -> Option<&CondVar> {
        self.cvars.get(&handle)
    }

    /// Destroys the object named by `handle`, whatever its kind.
    ///
    /// # Errors
    /// [`SyncError::NotQuiescent`] if the object is still in use, in which
    /// case nothing changes; [`SyncError::HandleNotFound`] if no object has
    /// this handle.
    pub fn reclaim(&mut self, handle: Handle) -> Result<ObjectKind, SyncError> {
        let (quiescent, kind) = if let Some(p) = self.pipes.get(&handle) {
            (p.is_quiescent(), ObjectKind::Pipe)
        } else if let Some(l) = self.locks.get(&handle) {
            (l.is_quiescent(), ObjectKind::Lock)
        } else if let Some(c) = self.cvars.get(&handle) {
            (c.is_quiescent(), ObjectKind::Cvar)
        } else {
            return Err(SyncError::HandleNotFound(handle));
        };

        if !quiescent {
            return Err(SyncError::NotQuiescent(handle));
        }
        match kind {
            ObjectKind::Pipe => {
                self.pipes.remove(&handle);
            }
            ObjectKind::Lock => {
                self.locks.remove(&handle);
            }
            ObjectKind::Cvar => {
                self.cvars.remove(&handle);
            }
        }
        debug!("reclaimed {kind:?} {handle}");
        Ok(kind)
    }
}
