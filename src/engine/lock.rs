//! Reentrant lock shared with the protocol engine
//!
//! The engine serialises its internal state through a pair of `lock` /
//! `unlock` callbacks and only promises not to deadlock if the lock is
//! reentrant: it may call `lock` again from inside a locked section on the
//! same thread. The two calls arrive separately, so no RAII guard can be held
//! across them; the guard is forgotten on `lock` and released on `unlock`.
//!
//! Host code takes the same mutex through `hold()`. Levels taken that way
//! are owned by their guard, so `unlock` only ever releases levels that
//! `lock` forgot, counted in `depth`.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use thiserror::Error;

/// Errors from the split lock/unlock API
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// `unlock` from a thread that does not hold the lock
    #[error("unlock called by a thread that does not own the engine lock")]
    NotOwner,

    /// `unlock` with no outstanding `lock` on the owning thread
    #[error("unlock called more times than lock")]
    Unbalanced,
}

/// Process-wide reentrant lock for protocol engine state
#[derive(Debug, Default)]
pub struct EngineLock {
    inner: ReentrantMutex<()>,
    // Levels forgotten by `lock`. Only touched by the owning thread.
    depth: AtomicUsize,
}

impl EngineLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking until it is free or already owned by the
    /// calling thread. Each call must be balanced by one `unlock`.
    pub fn lock(&self) {
        std::mem::forget(self.inner.lock());
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Release one level of a previous `lock`.
    ///
    /// Levels held by a live `hold()` guard are never released here.
    pub fn unlock(&self) -> Result<(), LockError> {
        if !self.inner.is_owned_by_current_thread() {
            return Err(LockError::NotOwner);
        }
        if self.depth.load(Ordering::Relaxed) == 0 {
            return Err(LockError::Unbalanced);
        }
        self.depth.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: the current thread owns the mutex and `depth` was
        // non-zero, so a guard forgotten by `lock` on this thread is
        // outstanding. Releasing one level balances exactly that call.
        unsafe { self.inner.force_unlock() };
        Ok(())
    }

    /// Scoped acquisition for host code that must not race the engine
    pub fn hold(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }

    /// Outstanding `lock` calls not yet balanced by `unlock`
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}
