//! Priority scheduler with aging.
//!
//! The run queue is sorted by priority value (lower runs first). Picking the
//! head bumps its value by one and re-inserts it behind every task that is
//! now at least as urgent, so a task that keeps winning gradually yields to
//! the rest and no ready task starves.
//!
//! The scheduler never switches stacks itself. [`Scheduler::reschedule`] is
//! handed the frame the trap entry pushed for the interrupted task and
//! returns the frame to resume; the trap exit path does the rest.

use core::fmt;
use core::ptr;

use heapless::Vec;

use super::queue::TaskQueue;
use super::task::{
    QueueTag, Task, TaskEntry, TaskId, TaskStack, TaskState, TaskTable, IDLE_TASK, MAX_TASKS,
    PRIORITY_CEILING,
};
use super::timer::{TimerError, TimerFn, TimerHandle, TimerKind, TimerList, MAX_TIMERS};
use crate::arch::cpu;
use crate::syscall::types::{ERR_AGAIN, ERR_INVALID_ARG, ERR_NO_MEMORY};
use crate::trap::{TrapFrame, TRAP_FRAME_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every task slot is taken.
    TaskTableFull,

    /// No memory for the task stack, or the stack cannot hold a frame.
    StackAllocationFailed,

    /// Priority above [`PRIORITY_CEILING`].
    InvalidPriority,
}

impl SpawnError {
    pub fn errno(self) -> i64 {
        match self {
            Self::TaskTableFull => ERR_AGAIN,
            Self::StackAllocationFailed => ERR_NO_MEMORY,
            Self::InvalidPriority => ERR_INVALID_ARG,
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskTableFull => f.write_str("task table full"),
            Self::StackAllocationFailed => f.write_str("task stack allocation failed"),
            Self::InvalidPriority => write!(f, "priority above {}", PRIORITY_CEILING),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Only a running task other than idle can wait.
    NoCurrentTask,

    /// No timer record left for the wake-up.
    TimerPoolFull,
}

impl WaitError {
    pub fn errno(self) -> i64 {
        match self {
            Self::NoCurrentTask => ERR_INVALID_ARG,
            Self::TimerPoolFull => ERR_AGAIN,
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCurrentTask => f.write_str("no running task can wait here"),
            Self::TimerPoolFull => f.write_str("timer pool exhausted"),
        }
    }
}

/// Result of one tick.
#[derive(Default)]
pub struct TickOutcome {
    /// The running task should be switched on this trap.
    pub reschedule: bool,

    /// Expired callback timers, in firing order. Run them after the
    /// scheduler lock is released.
    pub callbacks: Vec<(TimerFn, usize), MAX_TIMERS>,

    /// Sleepers moved back to the run queue.
    pub woken: usize,
}

pub struct Scheduler {
    tasks: TaskTable,
    run_queue: TaskQueue,
    blocked: TaskQueue,
    timers: TimerList,
    current: Option<TaskId>,
    idle_installed: bool,
    ticks: u64,
    reaped: Vec<TaskStack, MAX_TASKS>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            run_queue: TaskQueue::new(QueueTag::RunQueue),
            blocked: TaskQueue::new(QueueTag::Blocked),
            timers: TimerList::new(),
            current: None,
            idle_installed: false,
            ticks: 0,
            reaped: Vec::new(),
        }
    }

    /// Adopt the running boot context as the idle task.
    ///
    /// The idle task never sits on the run queue; it runs only when the
    /// queue is empty. Its frame is captured on the first trap.
    pub fn install_idle_task(&mut self) {
        if self.idle_installed {
            return;
        }
        self.tasks.insert(Task {
            id: IDLE_TASK,
            state: TaskState::Running,
            priority: PRIORITY_CEILING,
            base_priority: PRIORITY_CEILING,
            timeslice: 1,
            ticks_left: 1,
            last_scheduled: self.ticks,
            times_scheduled: 0,
            frame: ptr::null_mut(),
            stack: None,
            next: None,
            queue: QueueTag::None,
            wake_timer: None,
        });
        self.idle_installed = true;
        if self.current.is_none() {
            self.current = Some(IDLE_TASK);
        }
    }

    /// Create a task that starts at `entry(arg)` on `stack`.
    ///
    /// A zero timeslice is raised to one tick.
    pub fn spawn(
        &mut self,
        entry: TaskEntry,
        arg: usize,
        priority: u16,
        timeslice: u64,
        stack: TaskStack,
    ) -> Result<TaskId, SpawnError> {
        if priority > PRIORITY_CEILING {
            return Err(SpawnError::InvalidPriority);
        }
        if stack.top() < stack.base() + TRAP_FRAME_SIZE {
            return Err(SpawnError::StackAllocationFailed);
        }
        let id = self.tasks.free_slot().ok_or(SpawnError::TaskTableFull)?;

        let frame = (stack.top() - TRAP_FRAME_SIZE) as *mut TrapFrame;
        let initial = TrapFrame::for_new_task(
            entry as usize,
            arg,
            stack.top(),
            super::task_return_trap as usize,
            cpu::global_pointer(),
        );
        // SAFETY:
        // - `TaskStack::new` guarantees the region is writable and owned by this task.
        // - The frame fits below `top` (checked above) and `top` is 16-byte aligned.
        unsafe { ptr::write(frame, initial) };

        let timeslice = timeslice.max(1);
        self.tasks.insert(Task {
            id,
            state: TaskState::Init,
            priority,
            base_priority: priority,
            timeslice,
            ticks_left: timeslice,
            last_scheduled: 0,
            times_scheduled: 0,
            frame,
            stack: Some(stack),
            next: None,
            queue: QueueTag::None,
            wake_timer: None,
        });

        self.tasks[id].state = TaskState::Ready;
        self.run_queue.insert_by_priority(&mut self.tasks, id);

        log::info!(
            target: "sched",
            "spawned task {} (priority {}, timeslice {})",
            id,
            priority,
            timeslice
        );
        Ok(id)
    }

    /// Record `current_frame` for the task that was interrupted and return
    /// the frame of the task to run next.
    ///
    /// # Panics
    /// If the run queue is empty and no idle task was installed.
    pub fn reschedule(&mut self, current_frame: *mut TrapFrame) -> *mut TrapFrame {
        // Step 1: save the interrupted context, unless that task is gone.
        if let Some(prev) = self.current {
            if let Some(task) = self.tasks.get_mut(prev) {
                if task.state != TaskState::Died {
                    debug_assert!(
                        task.stack.map_or(true, |s| s.contains(current_frame as usize)),
                        "frame {:p} outside stack of task {}",
                        current_frame,
                        prev
                    );
                    task.frame = current_frame;
                }
            }
        }

        // Step 2: tasks that died on an earlier pass no longer own the stack
        // we are running on.
        self.reap();

        // Step 3: pick.
        let next = match self.select_next() {
            Some(id) => id,
            None if self.idle_installed => IDLE_TASK,
            None => panic!("schedule: run queue empty and no idle task installed"),
        };

        // Step 4: demote the previous task.
        if let Some(prev) = self.current.filter(|&prev| prev != next) {
            if let Some(task) = self.tasks.get_mut(prev) {
                if task.state == TaskState::Running {
                    task.state = TaskState::Ready;
                }
                if task.ticks_left == 0 {
                    task.ticks_left = task.timeslice;
                }
            }
        }

        // Step 5: run the pick.
        let ticks = self.ticks;
        let task = &mut self.tasks[next];
        task.state = TaskState::Running;
        task.last_scheduled = ticks;
        task.times_scheduled += 1;
        if task.ticks_left == 0 {
            task.ticks_left = task.timeslice;
        }
        if task.frame.is_null() {
            panic!("schedule: task {} has no saved context", next);
        }

        if self.current != Some(next) {
            log::trace!(target: "sched", "switch {:?} -> {}", self.current, next);
        }
        self.current = Some(next);
        task.frame
    }

    /// Advance time by one tick: fire due timers and charge the running
    /// task's timeslice.
    pub fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        let mut outcome = TickOutcome::default();
        let mut most_urgent_woken = None;

        while let Some(expired) = self.timers.pop_expired(self.ticks) {
            match expired.kind {
                TimerKind::Sleep {
                    task,
                    owned_by_sleep,
                } => {
                    if self.wake_sleeper(task, expired.handle, owned_by_sleep) {
                        outcome.woken += 1;
                        let priority = self.tasks[task].priority;
                        most_urgent_woken =
                            Some(most_urgent_woken.map_or(priority, |p: u16| p.min(priority)));
                    }
                }
                TimerKind::Callback { func, arg } => {
                    if outcome.callbacks.push((func, arg)).is_err() {
                        log::error!(target: "timer", "dropped callback timer, batch full");
                    }
                }
            }
        }

        let Some(current) = self.current else {
            return outcome;
        };

        if current == IDLE_TASK {
            outcome.reschedule = !self.run_queue.is_empty();
        } else if let Some(task) = self.tasks.get_mut(current) {
            if task.state == TaskState::Running {
                task.ticks_left = task.ticks_left.saturating_sub(1);
                outcome.reschedule = task.ticks_left == 0;
            } else {
                outcome.reschedule = true;
            }
            if most_urgent_woken.is_some_and(|p| p < task.priority) {
                outcome.reschedule = true;
            }
        }
        outcome
    }

    /// Put the running task to sleep for `ticks`. The caller must still
    /// request a reschedule.
    pub fn sleep_current(&mut self, ticks: u64) -> Result<TaskId, WaitError> {
        let id = self.running_task().ok_or(WaitError::NoCurrentTask)?;
        let target = self.ticks.saturating_add(ticks);
        let handle = self
            .timers
            .insert(
                target,
                TimerKind::Sleep {
                    task: id,
                    owned_by_sleep: true,
                },
            )
            .map_err(|_| WaitError::TimerPoolFull)?;

        self.run_queue.remove(&mut self.tasks, id);
        let task = &mut self.tasks[id];
        task.state = TaskState::Sleeping;
        task.queue = QueueTag::Sleeping;
        task.wake_timer = Some(handle);

        log::trace!(target: "sched", "task {} sleeps until tick {}", id, target);
        Ok(id)
    }

    /// Park the running task on the block list until [`Scheduler::wake`].
    /// The caller must still request a reschedule.
    pub fn block_current(&mut self) -> Result<TaskId, WaitError> {
        let id = self.running_task().ok_or(WaitError::NoCurrentTask)?;
        self.run_queue.remove(&mut self.tasks, id);
        self.tasks[id].state = TaskState::Blocked;
        self.blocked.push_back(&mut self.tasks, id);
        Ok(id)
    }

    /// Make a blocked or sleeping task ready. A sleeper's timer is
    /// cancelled.
    pub fn wake(&mut self, id: TaskId) -> bool {
        let Some(state) = self.tasks.get(id).map(Task::state) else {
            return false;
        };

        match state {
            TaskState::Blocked => {
                self.blocked.remove(&mut self.tasks, id);
            }
            TaskState::Sleeping => {
                if let Some(handle) = self.tasks[id].wake_timer.take() {
                    self.timers.cancel(handle);
                }
                self.tasks[id].queue = QueueTag::None;
            }
            _ => return false,
        }

        self.tasks[id].state = TaskState::Ready;
        self.run_queue.insert_by_priority(&mut self.tasks, id);
        true
    }

    /// Wake `id` only if it is parked on the block list.
    pub fn wake_blocked(&mut self, id: TaskId) -> bool {
        self.tasks.get(id).map(Task::state) == Some(TaskState::Blocked) && self.wake(id)
    }

    /// Retire the running task. Its slot and stack are released on the next
    /// scheduling pass after the switch away from it.
    pub fn exit_current(&mut self) -> Option<TaskId> {
        let id = self.running_task()?;
        self.run_queue.remove(&mut self.tasks, id);
        self.tasks[id].wake_timer = None;
        // the slot may be reused; none of the task's timers may outlive it
        let bound: Vec<TimerHandle, MAX_TIMERS> = self
            .timers
            .iter()
            .filter(|(_, _, kind)| matches!(kind, TimerKind::Sleep { task, .. } if *task == id))
            .map(|(handle, _, _)| handle)
            .collect();
        for handle in bound {
            self.timers.cancel(handle);
        }
        self.tasks[id].state = TaskState::Died;
        log::info!(target: "sched", "task {} exited", id);
        Some(id)
    }

    /// Arm a timer `delta` ticks from now. Without a callback the timer is
    /// bound to the running task and wakes it if it is asleep when it fires,
    /// cutting any pending sleep short.
    pub fn create_timer(
        &mut self,
        callback: Option<TimerFn>,
        arg: usize,
        delta: u64,
    ) -> Result<TimerHandle, TimerError> {
        let kind = match callback {
            Some(func) => TimerKind::Callback { func, arg },
            None => TimerKind::Sleep {
                task: self.running_task().ok_or(TimerError::NoCurrentTask)?,
                owned_by_sleep: false,
            },
        };
        self.timers.insert(self.ticks.saturating_add(delta), kind)
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) -> Result<(), TimerError> {
        let kind = self.timers.cancel(handle).ok_or(TimerError::StaleHandle)?;
        if let TimerKind::Sleep { task, .. } = kind {
            if let Some(task) = self.tasks.get_mut(task) {
                if task.wake_timer == Some(handle) {
                    task.wake_timer = None;
                }
            }
        }
        Ok(())
    }

    /// Stacks of reaped tasks, to be freed once the lock is dropped.
    pub fn take_reaped_stacks(&mut self) -> Vec<TaskStack, MAX_TASKS> {
        core::mem::take(&mut self.reaped)
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_idle_task(&self) -> bool {
        self.idle_installed
    }

    /// Run queue members, head first.
    pub fn run_queue(&self) -> Vec<TaskId, MAX_TASKS> {
        self.run_queue.iter(&self.tasks).collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    pub fn timers(&self) -> &TimerList {
        &self.timers
    }

    /// Pop the head, age it, and put it back.
    fn select_next(&mut self) -> Option<TaskId> {
        let id = self.run_queue.pop_front(&mut self.tasks)?;
        let task = &mut self.tasks[id];
        task.priority = (task.priority + 1).min(PRIORITY_CEILING);
        self.run_queue.insert_by_priority(&mut self.tasks, id);
        Some(id)
    }

    fn running_task(&self) -> Option<TaskId> {
        self.current
            .filter(|&id| id != IDLE_TASK)
            .filter(|&id| self.tasks.get(id).map(Task::state) == Some(TaskState::Running))
    }

    /// A sleep's own timer only wakes the sleep that armed it; any other
    /// sleep timer of the task wakes it whatever it is sleeping on.
    fn wake_sleeper(&mut self, id: TaskId, handle: TimerHandle, owned_by_sleep: bool) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if task.state != TaskState::Sleeping {
            return false;
        }
        if owned_by_sleep && task.wake_timer != Some(handle) {
            return false;
        }
        if let Some(own) = task.wake_timer.take() {
            if own != handle {
                self.timers.cancel(own);
            }
        }
        let task = &mut self.tasks[id];
        task.queue = QueueTag::None;
        task.state = TaskState::Ready;
        self.run_queue.insert_by_priority(&mut self.tasks, id);
        true
    }

    fn reap(&mut self) {
        let current = self.current;
        for id in IDLE_TASK + 1..MAX_TASKS {
            let dead = self
                .tasks
                .get(id)
                .is_some_and(|task| task.state == TaskState::Died);
            if !dead || current == Some(id) {
                continue;
            }
            if let Some(stack) = self.tasks.remove(id).and_then(|task| task.stack) {
                if self.reaped.push(stack).is_err() {
                    log::error!(target: "sched", "leaking stack of task {}", id);
                }
            }
            log::debug!(target: "sched", "reaped task {}", id);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY:
// - The raw frame pointers refer to task stacks owned by the scheduler.
// - The global instance is only reached through a SpinLock, which masks interrupts.
unsafe impl Send for Scheduler {}
