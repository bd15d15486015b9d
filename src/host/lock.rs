//! Host interpreter serialization lock
//!
//! Design: a reentrant lock so a callback invoked synchronously on the calling
//! thread can re-enter host code even when the lock was not released around
//! the native call. `allow_threads` releases this guard's hold for the
//! duration of a closure and re-acquires afterwards.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::fmt;
use tracing::trace;

#[derive(Default)]
pub struct HostLock {
    inner: ReentrantMutex<()>,
}

/// Proof that the current thread holds the host lock
pub struct HostGuard<'a> {
    guard: ReentrantMutexGuard<'a, ()>,
}

impl HostLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the host lock is held by this thread
    pub fn acquire(&self) -> HostGuard<'_> {
        HostGuard {
            guard: self.inner.lock(),
        }
    }

    pub fn try_acquire(&self) -> Option<HostGuard<'_>> {
        self.inner.try_lock().map(|guard| HostGuard { guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl fmt::Debug for HostLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLock").field("locked", &self.is_locked()).finish()
    }
}

impl HostGuard<'_> {
    /// Run `f` with the host lock released
    pub fn allow_threads<R>(&mut self, f: impl FnOnce() -> R) -> R {
        trace!(event = "host_lock_release");
        let result = ReentrantMutexGuard::unlocked(&mut self.guard, f);
        trace!(event = "host_lock_reacquire");
        result
    }
}
