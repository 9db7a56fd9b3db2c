//! Bounded LIFO pool of positional-I/O file handles. Sized by
//! `open_file_count`; each handle is checked out under exclusive semantics
//! for the duration of one positional I/O call and returned. Waiters block
//! when the pool is empty.
//!
//! A LIFO keeps recently-used handles hot rather than round-robining
//! through every descriptor.

use crate::error::{Error, Result};
use crate::platform::PlatformFile;
use std::sync::{Arc, Condvar, Mutex};

pub(crate) struct HandlePool<F: PlatformFile> {
    handles: Mutex<Vec<F>>,
    available: Condvar,
    capacity: usize,
}

impl<F: PlatformFile> HandlePool<F> {
    pub(crate) fn new(primary: &F, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut handles = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            handles.push(primary.try_clone()?);
        }
        Ok(Self {
            handles: Mutex::new(handles),
            available: Condvar::new(),
            capacity,
        })
    }

    /// Checks out a handle, blocking until one is returned if the pool is
    /// momentarily exhausted.
    pub(crate) fn checkout(&self) -> Result<PooledHandle<'_, F>> {
        let mut guard = self.handles.lock().map_err(|_| poisoned())?;
        while guard.is_empty() {
            tracing::debug!("handle pool exhausted, waiting for a checkout to return");
            guard = self.available.wait(guard).map_err(|_| poisoned())?;
        }
        let handle = guard.pop().expect("non-empty checked above");
        Ok(PooledHandle {
            pool: self,
            handle: Some(handle),
        })
    }

    fn checkin(&self, handle: F) {
        let mut guard = match self.handles.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug_assert!(guard.len() < self.capacity);
        guard.push(handle);
        self.available.notify_one();
    }
}

fn poisoned() -> Error {
    Error::Io("handle pool mutex poisoned".to_string())
}

/// A checked-out handle; returned to the pool on drop.
pub(crate) struct PooledHandle<'a, F: PlatformFile> {
    pool: &'a HandlePool<F>,
    handle: Option<F>,
}

impl<F: PlatformFile> std::ops::Deref for PooledHandle<'_, F> {
    type Target = F;
    fn deref(&self) -> &F {
        self.handle.as_ref().expect("handle present until drop")
    }
}

impl<F: PlatformFile> Drop for PooledHandle<'_, F> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.checkin(handle);
        }
    }
}
