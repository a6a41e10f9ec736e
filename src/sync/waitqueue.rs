//! Multi-waiter wait queue.
//!
//! Tasks register themselves as waiters and are parked with
//! [`scheduler::block_current`]; [`WaitQueue::wake_all`] or
//! [`WaitQueue::wake_one`] makes them ready again. Waking is safe from
//! interrupt handlers.

use core::sync::atomic::{AtomicBool, Ordering};

use super::critical::CriticalSection;
use crate::scheduler::{self, TaskId, MAX_TASKS};

pub struct WaitQueue {
    waiters: [AtomicBool; MAX_TASKS],
}

impl WaitQueue {
    pub const fn new() -> Self {
        const IDLE: AtomicBool = AtomicBool::new(false);
        Self {
            waiters: [IDLE; MAX_TASKS],
        }
    }

    /// Block the calling task if `should_block` holds.
    ///
    /// The predicate is evaluated with interrupts masked, so a producer's
    /// wake from an interrupt handler cannot fall between the check and the
    /// registration. Returns `true` if the task was parked; it is switched
    /// away from as soon as interrupts are unmasked again.
    pub fn wait_if(&self, should_block: impl FnOnce() -> bool) -> bool {
        let _section = CriticalSection::enter();

        if !should_block() {
            return false;
        }
        match scheduler::block_current() {
            Ok(id) => {
                self.waiters[id].store(true, Ordering::Release);
                true
            }
            Err(err) => {
                log::warn!(target: "sched", "wait_if: {}", err);
                false
            }
        }
    }

    /// Make every registered waiter ready. Returns how many were woken.
    pub fn wake_all(&self) -> usize {
        (0..MAX_TASKS).filter(|&id| self.wake_slot(id)).count()
    }

    /// Make the lowest-numbered waiter ready.
    pub fn wake_one(&self) -> Option<TaskId> {
        (0..MAX_TASKS).find(|&id| self.wake_slot(id))
    }

    pub fn has_waiters(&self) -> bool {
        self.waiters.iter().any(|w| w.load(Ordering::Acquire))
    }

    /// A flag left behind by a wake from elsewhere must not end a later
    /// sleep of the same task.
    fn wake_slot(&self, id: TaskId) -> bool {
        self.waiters[id].swap(false, Ordering::AcqRel) && scheduler::wake_blocked(id)
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
