//! A non-blocking mutual-exclusion flag used to reject an overlapping GET
//! or POST instead of queueing it.

use std::sync::atomic::{AtomicBool, Ordering};

/// `try_lock()` returns `false` immediately if another holder is already
/// in, rather than blocking — the long-polling server needs to answer a
/// second concurrent GET with 400, not make it wait its turn.
#[derive(Debug, Default)]
pub struct TryLock {
    locked: AtomicBool,
}

impl TryLock {
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Attempts to acquire the lock. Returns a guard on success, or
    /// `None` if it was already held.
    pub fn try_lock(&self) -> Option<TryLockGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TryLockGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Releases the lock when dropped.
pub struct TryLockGuard<'a> {
    lock: &'a TryLock,
}

impl Drop for TryLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_attempt_fails_while_first_holds() {
        let lock = TryLock::new();
        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }
}
