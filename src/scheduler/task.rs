//! Task descriptors and the fixed arena that owns them.

use core::ops::{Index, IndexMut};

use super::timer::TimerHandle;
use crate::trap::TrapFrame;

/// Arena slot of a task. Slot 0 is the idle task.
pub type TaskId = usize;

/// Entry point of a schedulable task.
///
/// Returning from it is the same as calling
/// [`task_exit`](super::task_exit): `ra` of the initial frame points at the
/// exit trampoline.
pub type TaskEntry = extern "C" fn(arg: usize);

pub const MAX_TASKS: usize = 16;
pub const IDLE_TASK: TaskId = 0;

/// Aging stops here; a task at the ceiling is the least urgent there is.
pub const PRIORITY_CEILING: u16 = 256;

pub const TASK_STACK_SIZE: usize = 16 * 1024;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Descriptor built, not yet on the run queue.
    Init,

    /// On the run queue, waiting to be picked.
    Ready,

    /// Executing on the hart. Still a member of the run queue.
    Running,

    /// Waiting for an explicit [`wake`](super::wake).
    Blocked,

    /// Waiting for its wake timer (or an explicit wake).
    Sleeping,

    /// Exited. The slot and stack stay reserved until the next scheduling
    /// pass, when execution has left the task's stack.
    Died,
}

/// The list that currently links a task. Exactly one owner at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTag {
    None,
    RunQueue,
    /// Bound to a sleep timer in the timer list.
    Sleeping,
    Blocked,
}

/// Stack region owned by one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStack {
    base: usize,
    size: usize,
}

impl TaskStack {
    /// # Safety
    /// `base..base + size` must be writable memory owned exclusively by the
    /// task this stack is handed to, until it is released again.
    pub unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 16-byte aligned initial stack pointer.
    pub fn top(&self) -> usize {
        (self.base + self.size) & !0xf
    }

    pub fn contains(&self, addr: usize) -> bool {
        (self.base..self.base + self.size).contains(&addr)
    }
}

/// One schedulable unit of execution.
pub struct Task {
    pub(crate) id: TaskId,

    pub(crate) state: TaskState,

    /// Current priority; lower is more urgent. Raised by one each time the
    /// task is picked, up to [`PRIORITY_CEILING`].
    pub(crate) priority: u16,

    /// Priority the task was created with.
    pub(crate) base_priority: u16,

    /// Ticks the task may run before a timer-driven preemption.
    pub(crate) timeslice: u64,

    /// Ticks left in the current slice. Refilled from `timeslice` once it
    /// reaches zero and the task is switched.
    pub(crate) ticks_left: u64,

    /// Tick at which the task was last picked.
    pub(crate) last_scheduled: u64,

    pub(crate) times_scheduled: u64,

    /// Saved context to resume from. Lives on the task's own stack (the boot
    /// stack for the idle task).
    pub(crate) frame: *mut TrapFrame,

    /// `None` only for the idle task, which runs on the boot stack.
    pub(crate) stack: Option<TaskStack>,

    /// Next task in whichever list `queue` names.
    pub(crate) next: Option<TaskId>,

    pub(crate) queue: QueueTag,

    /// Pending wake-up timer while `Sleeping`.
    pub(crate) wake_timer: Option<TimerHandle>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn base_priority(&self) -> u16 {
        self.base_priority
    }

    pub fn timeslice(&self) -> u64 {
        self.timeslice
    }

    pub fn ticks_left(&self) -> u64 {
        self.ticks_left
    }

    pub fn last_scheduled(&self) -> u64 {
        self.last_scheduled
    }

    pub fn times_scheduled(&self) -> u64 {
        self.times_scheduled
    }

    pub fn frame(&self) -> *mut TrapFrame {
        self.frame
    }

    pub fn stack(&self) -> Option<TaskStack> {
        self.stack
    }

    pub fn queue(&self) -> QueueTag {
        self.queue
    }
}

/// Fixed arena of task descriptors, indexed by [`TaskId`].
pub struct TaskTable {
    slots: [Option<Task>; MAX_TASKS],
}

impl TaskTable {
    const EMPTY: Option<Task> = None;

    pub const fn new() -> Self {
        Self {
            slots: [Self::EMPTY; MAX_TASKS],
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id)?.as_mut()
    }

    /// Lowest free slot other than the idle slot.
    pub(crate) fn free_slot(&self) -> Option<TaskId> {
        (IDLE_TASK + 1..MAX_TASKS).find(|&id| self.slots[id].is_none())
    }

    pub(crate) fn insert(&mut self, task: Task) {
        let id = task.id;
        debug_assert!(self.slots[id].is_none(), "task slot {} already in use", id);
        self.slots[id] = Some(task);
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.slots.get_mut(id)?.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<TaskId> for TaskTable {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        match self.get(id) {
            Some(task) => task,
            None => panic!("no task in slot {}", id),
        }
    }
}

impl IndexMut<TaskId> for TaskTable {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        match self.get_mut(id) {
            Some(task) => task,
            None => panic!("no task in slot {}", id),
        }
    }
}
