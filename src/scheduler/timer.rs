//! Software timers: a tick-ordered list over a fixed record arena.

use core::fmt;

use super::task::TaskId;
use crate::syscall::types::{ERR_AGAIN, ERR_INVALID_ARG};

pub type TimerFn = fn(arg: usize);

pub const MAX_TIMERS: usize = 32;

/// What happens when a timer fires.
#[derive(Clone, Copy, Debug)]
pub enum TimerKind {
    /// Call `func(arg)` from the timer interrupt.
    Callback { func: TimerFn, arg: usize },
    /// Wake `task` if it is sleeping. A timer armed by the sleep itself
    /// (`owned_by_sleep`) only fires for that sleep.
    Sleep { task: TaskId, owned_by_sleep: bool },
}

/// Identifies one timer record. Stale once the record fired or was
/// cancelled, even if the slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    slot: u16,
    generation: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Every record slot is in use.
    PoolFull,
    /// A sleep timer was requested outside of a task.
    NoCurrentTask,
    /// The record already fired or was cancelled.
    StaleHandle,
}

impl TimerError {
    pub fn errno(self) -> i64 {
        match self {
            Self::PoolFull => ERR_AGAIN,
            Self::NoCurrentTask | Self::StaleHandle => ERR_INVALID_ARG,
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolFull => f.write_str("timer pool exhausted"),
            Self::NoCurrentTask => f.write_str("no current task to bind the timer to"),
            Self::StaleHandle => f.write_str("timer already fired or cancelled"),
        }
    }
}

/// A record removed from the list because its target tick was reached.
#[derive(Clone, Copy, Debug)]
pub struct ExpiredTimer {
    pub handle: TimerHandle,
    pub target: u64,
    pub kind: TimerKind,
}

#[derive(Clone, Copy)]
struct TimerRecord {
    target: u64,
    kind: TimerKind,
    next: Option<u16>,
}

#[derive(Clone, Copy)]
struct TimerSlot {
    generation: u16,
    record: Option<TimerRecord>,
}

pub struct TimerList {
    slots: [TimerSlot; MAX_TIMERS],
    head: Option<u16>,
    len: usize,
}

impl TimerList {
    const EMPTY_SLOT: TimerSlot = TimerSlot {
        generation: 0,
        record: None,
    };

    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY_SLOT; MAX_TIMERS],
            head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Target of the earliest pending record.
    pub fn next_deadline(&self) -> Option<u64> {
        self.head.map(|slot| self.record(slot).target)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.live_slot(handle).is_some()
    }

    /// Insert in target order; equal targets keep arrival order.
    pub fn insert(&mut self, target: u64, kind: TimerKind) -> Result<TimerHandle, TimerError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.record.is_none())
            .ok_or(TimerError::PoolFull)? as u16;

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            let record = self.record(node);
            if record.target > target {
                break;
            }
            prev = Some(node);
            cursor = record.next;
        }

        let next = match prev {
            None => self.head.replace(slot),
            Some(prev) => self.record_mut(prev).next.replace(slot),
        };
        self.slots[slot as usize].record = Some(TimerRecord { target, kind, next });
        self.len += 1;

        Ok(TimerHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        })
    }

    /// Unlink and discard a pending record.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<TimerKind> {
        let slot = self.live_slot(handle)?;
        let next = self.record(slot).next;

        if self.head == Some(slot) {
            self.head = next;
        } else {
            let mut cursor = self.head;
            while let Some(node) = cursor {
                let record = self.record_mut(node);
                if record.next == Some(slot) {
                    record.next = next;
                    break;
                }
                cursor = record.next;
            }
        }

        Some(self.release(slot).kind)
    }

    /// Remove the head record if its target is at or before `now`.
    pub fn pop_expired(&mut self, now: u64) -> Option<ExpiredTimer> {
        let slot = self.head?;
        let generation = self.slots[slot as usize].generation;
        let record = *self.record(slot);
        if record.target > now {
            return None;
        }

        self.head = record.next;
        self.release(slot);
        Some(ExpiredTimer {
            handle: TimerHandle { slot, generation },
            target: record.target,
            kind: record.kind,
        })
    }

    /// Pending records in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (TimerHandle, u64, TimerKind)> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let slot = cursor?;
            let record = self.record(slot);
            cursor = record.next;
            Some((
                TimerHandle {
                    slot,
                    generation: self.slots[slot as usize].generation,
                },
                record.target,
                record.kind,
            ))
        })
    }

    fn live_slot(&self, handle: TimerHandle) -> Option<u16> {
        let slot = self.slots.get(handle.slot as usize)?;
        (slot.generation == handle.generation && slot.record.is_some()).then_some(handle.slot)
    }

    fn record(&self, slot: u16) -> &TimerRecord {
        match &self.slots[slot as usize].record {
            Some(record) => record,
            None => panic!("timer slot {} linked but empty", slot),
        }
    }

    fn record_mut(&mut self, slot: u16) -> &mut TimerRecord {
        match &mut self.slots[slot as usize].record {
            Some(record) => record,
            None => panic!("timer slot {} linked but empty", slot),
        }
    }

    fn release(&mut self, slot: u16) -> TimerRecord {
        let record = *self.record(slot);
        let entry = &mut self.slots[slot as usize];
        entry.record = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.len -= 1;
        record
    }
}

impl Default for TimerList {
    fn default() -> Self {
        Self::new()
    }
}

/// Time since boot, split for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Uptime {
    pub hours: u64,
    pub minutes: u8,
    pub seconds: u8,
}

impl Uptime {
    pub fn from_ticks(ticks: u64, ticks_per_second: u64) -> Self {
        let total = ticks / ticks_per_second.max(1);
        Self {
            hours: total / 3600,
            minutes: (total / 60 % 60) as u8,
            seconds: (total % 60) as u8,
        }
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}
