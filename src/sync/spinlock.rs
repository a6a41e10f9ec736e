//! Spinlock with interrupt masking.
//!
//! Every kernel singleton (allocator, scheduler, IRQ registry, log capture)
//! sits behind one of these. Holding the guard keeps interrupts masked, which
//! is what makes it safe to touch the same state from trap context.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use super::lock::{Lock, LockGuard};

pub struct SpinLock<T> {
    lock: Lock,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            lock: Lock::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        SpinLockGuard {
            data: self.data.get(),
            _held: self.lock.acquire(),
        }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.lock.try_acquire().map(|held| SpinLockGuard {
            data: self.data.get(),
            _held: held,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    data: *mut T,
    _held: LockGuard<'a>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY:
        // - The spinlock guarantees exclusive access while the guard lives.
        unsafe { &*self.data }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY:
        // - The spinlock guarantees exclusive access while the guard lives.
        unsafe { &mut *self.data }
    }
}

// SAFETY:
// - Access to `data` is synchronized via the lock flag.
// - `T: Send` ensures it is safe to hand the value between contexts.
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}
