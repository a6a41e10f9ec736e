//! Scheduler module facade.
//!
//! The priority scheduler itself lives in `priority.rs` and works on a plain
//! [`Scheduler`] value. This module owns the single global instance, hands
//! out task stacks from the heap, and exposes the calls the trap dispatcher,
//! the syscall layer and kernel code use.
//!
//! Every suspension (`task_yield`, `sleep`, `block_current`, `task_exit`)
//! ends by raising the machine software interrupt on this hart. The switch
//! itself happens in [`on_software_interrupt`] once interrupts are enabled.

mod priority;
mod queue;
mod task;
mod timer;

pub use priority::{Scheduler, SpawnError, TickOutcome, WaitError};
pub use task::{
    QueueTag, Task, TaskEntry, TaskId, TaskStack, TaskState, TaskTable, IDLE_TASK, MAX_TASKS,
    PRIORITY_CEILING, TASK_STACK_SIZE,
};
pub use timer::{
    ExpiredTimer, TimerError, TimerFn, TimerHandle, TimerKind, TimerList, Uptime, MAX_TIMERS,
};

use heapless::Vec;

use crate::arch::{clint, cpu};
use crate::config;
use crate::memory;
use crate::sync::SpinLock;
use crate::trap::TrapFrame;

static SCHED: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

/// Executes `f` while holding the scheduler spinlock.
fn with_sched<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut sched = SCHED.lock();
    f(&mut sched)
}

/// Read-only view of the global scheduler.
pub fn inspect<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    let sched = SCHED.lock();
    f(&sched)
}

/// Reset the scheduler and adopt the caller as the idle task.
///
/// Stacks of tasks left over from a previous run go back to the heap.
pub fn init() {
    let stacks = with_sched(|sched| {
        let mut stacks = sched.take_reaped_stacks();
        for id in IDLE_TASK + 1..MAX_TASKS {
            if let Some(stack) = sched.task(id).and_then(Task::stack) {
                let _ = stacks.push(stack);
            }
        }
        *sched = Scheduler::new();
        sched.install_idle_task();
        stacks
    });
    free_stacks(&stacks);
}

/// Create a task running `entry(arg)` on a fresh heap stack.
pub fn task_create(
    entry: TaskEntry,
    arg: usize,
    priority: u16,
    timeslice: u64,
) -> Result<TaskId, SpawnError> {
    if priority > PRIORITY_CEILING {
        return Err(SpawnError::InvalidPriority);
    }

    // Allocate outside the scheduler lock.
    let base = memory::malloc(TASK_STACK_SIZE);
    if base.is_null() {
        return Err(SpawnError::StackAllocationFailed);
    }
    // SAFETY: the block is fresh from the heap and handed to the task alone.
    let stack = unsafe { TaskStack::new(base as usize, TASK_STACK_SIZE) };

    let result = with_sched(|sched| sched.spawn(entry, arg, priority, timeslice, stack));
    if result.is_err() {
        memory::free(base);
    }
    result
}

/// Create a task with the configured default priority and timeslice.
pub fn task_create_default(entry: TaskEntry, arg: usize) -> Result<TaskId, SpawnError> {
    let config = config::get();
    task_create(entry, arg, config.default_priority, config.default_timeslice)
}

/// Give up the hart. The task stays ready.
pub fn task_yield() {
    clint::raise_software_interrupt();
}

/// Retire the running task from trap context. It is switched away from on
/// the pending software interrupt.
pub fn exit_current() -> Option<TaskId> {
    let id = with_sched(Scheduler::exit_current);
    clint::raise_software_interrupt();
    id
}

/// Terminate the running task.
pub fn task_exit() -> ! {
    exit_current();
    loop {
        cpu::wait_for_interrupt();
    }
}

/// Where a task's `ra` points on creation, so returning from the entry
/// function exits the task.
pub extern "C" fn task_return_trap() -> ! {
    task_exit()
}

/// Suspend the running task for `ticks` timer ticks.
pub fn sleep(ticks: u64) -> Result<(), WaitError> {
    with_sched(|sched| sched.sleep_current(ticks))?;
    clint::raise_software_interrupt();
    Ok(())
}

/// Suspend the running task until [`wake`].
pub fn block_current() -> Result<TaskId, WaitError> {
    let id = with_sched(Scheduler::block_current)?;
    clint::raise_software_interrupt();
    Ok(id)
}

/// Make a blocked or sleeping task ready again.
pub fn wake(id: TaskId) -> bool {
    with_sched(|sched| sched.wake(id))
}

/// Like [`wake`], but leaves a task that is not blocked untouched.
pub fn wake_blocked(id: TaskId) -> bool {
    with_sched(|sched| sched.wake_blocked(id))
}

/// Arm a one-shot timer `ticks` from now.
///
/// With a callback it runs from the timer interrupt; without one the timer
/// wakes the calling task if it is asleep at that point, ending whatever
/// sleep is in progress.
pub fn timer_create(
    callback: Option<TimerFn>,
    arg: usize,
    ticks: u64,
) -> Result<TimerHandle, TimerError> {
    with_sched(|sched| sched.create_timer(callback, arg, ticks))
}

pub fn timer_cancel(handle: TimerHandle) -> Result<(), TimerError> {
    with_sched(|sched| sched.cancel_timer(handle))
}

/// Software interrupt: switch tasks.
pub fn on_software_interrupt(frame: *mut TrapFrame) -> *mut TrapFrame {
    let (next, stacks) = with_sched(|sched| {
        let next = sched.reschedule(frame);
        (next, sched.take_reaped_stacks())
    });
    free_stacks(&stacks);
    next
}

/// Timer interrupt: advance time, run due callbacks, preempt if needed.
pub fn on_timer_tick(frame: *mut TrapFrame) -> *mut TrapFrame {
    let outcome = with_sched(Scheduler::tick);

    for &(callback, arg) in &outcome.callbacks {
        callback(arg);
    }

    if outcome.reschedule {
        on_software_interrupt(frame)
    } else {
        frame
    }
}

fn free_stacks(stacks: &Vec<TaskStack, MAX_TASKS>) {
    for stack in stacks {
        memory::free(stack.base() as *mut u8);
    }
}

pub fn current_task_id() -> Option<TaskId> {
    inspect(Scheduler::current)
}

pub fn task_state(id: TaskId) -> Option<TaskState> {
    inspect(|sched| sched.task(id).map(Task::state))
}

pub fn task_priority(id: TaskId) -> Option<u16> {
    inspect(|sched| sched.task(id).map(Task::priority))
}

pub fn times_scheduled(id: TaskId) -> Option<u64> {
    inspect(|sched| sched.task(id).map(Task::times_scheduled))
}

pub fn ticks() -> u64 {
    inspect(Scheduler::ticks)
}

pub fn uptime() -> Uptime {
    Uptime::from_ticks(ticks(), config::get().ticks_per_second)
}
