//! One-word lock for task-side critical sections.
//!
//! On a single hart a lock holder cannot be preempted once interrupts are
//! masked, so the flag itself only ever spins when a holder gave up the CPU
//! voluntarily while still holding it. That is a bug in the caller and shows
//! up as a hang in `acquire`.

use core::sync::atomic::{AtomicBool, Ordering};

use super::critical::CriticalSection;

pub struct Lock {
    locked: AtomicBool,
}

/// Held lock. Releases the flag, then restores interrupts, on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    _section: CriticalSection,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn acquire(&self) -> LockGuard<'_> {
        let section = CriticalSection::enter();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        LockGuard {
            lock: self,
            _section: section,
        }
    }

    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        let section = CriticalSection::enter();
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard {
                lock: self,
                _section: section,
            })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // `_section` drops after this body, so the flag is clear before
        // interrupts come back on.
        self.lock.locked.store(false, Ordering::Release);
    }
}
