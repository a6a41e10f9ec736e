//! WaitQueue integration tests against the global scheduler.

mod common;

use common::{interrupt_frame, noop_task};
use xinos_kernel::arch::{clint, cpu};
use xinos_kernel::scheduler::{self, TaskId, TaskState};
use xinos_kernel::sync::WaitQueue;
use xinos_kernel::trap::{self, TrapFrame};

const IRQ_SOFTWARE: u64 = 3;

/// Switch from whatever runs on `frame` to the next task.
fn switch(frame: &mut TrapFrame) -> &'static mut TrapFrame {
    *frame = interrupt_frame(IRQ_SOFTWARE);
    // SAFETY: task frames live on heap stacks that outlive the test; the
    // idle frame is the caller's boot frame.
    unsafe { &mut *trap::dispatch(frame) }
}

fn spawn(priority: u16) -> TaskId {
    scheduler::task_create(noop_task, 0, priority, 10).expect("task")
}

#[test]
fn false_predicate_does_not_block() {
    let _guard = common::boot();
    let queue = WaitQueue::new();
    let id = spawn(10);
    let mut boot = TrapFrame::zeroed();
    switch(&mut boot);

    let raised = clint::software_interrupts_raised();
    assert!(!queue.wait_if(|| false));
    assert_eq!(scheduler::task_state(id), Some(TaskState::Running));
    assert!(!queue.has_waiters());
    assert_eq!(clint::software_interrupts_raised(), raised);
}

#[test]
fn idle_cannot_wait() {
    let _guard = common::boot();
    let queue = WaitQueue::new();
    assert!(!queue.wait_if(|| true));
    assert!(!queue.has_waiters());
}

#[test]
fn predicate_runs_with_interrupts_masked() {
    let _guard = common::boot();
    cpu::enable_interrupts();
    let queue = WaitQueue::new();

    queue.wait_if(|| {
        assert!(!cpu::interrupts_enabled());
        false
    });
    assert!(cpu::interrupts_enabled(), "previous state restored");
}

/// Contract: a waiter stays blocked until woken.
/// Given: two tasks, both parked on the same queue.
/// When: wake_one, then wake_all.
/// Then: the lowest-numbered waiter is woken first, and every waiter is
/// back in the run queue after wake_all.
#[test]
fn waiters_block_until_woken() {
    let _guard = common::boot();
    let queue = WaitQueue::new();
    let a = spawn(10);
    let b = spawn(20);
    let mut boot = TrapFrame::zeroed();

    let frame_a = switch(&mut boot);
    assert_eq!(scheduler::current_task_id(), Some(a));
    assert!(queue.wait_if(|| true));
    assert_eq!(scheduler::task_state(a), Some(TaskState::Blocked));
    assert!(clint::software_interrupt_pending());

    switch(frame_a);
    assert_eq!(scheduler::current_task_id(), Some(b));
    assert!(queue.wait_if(|| true));
    assert_eq!(scheduler::task_state(b), Some(TaskState::Blocked));
    assert!(queue.has_waiters());

    assert_eq!(queue.wake_one(), Some(a));
    assert_eq!(scheduler::task_state(a), Some(TaskState::Ready));
    assert_eq!(scheduler::task_state(b), Some(TaskState::Blocked));

    assert_eq!(queue.wake_all(), 1);
    assert_eq!(scheduler::task_state(b), Some(TaskState::Ready));
    assert!(!queue.has_waiters());
    assert_eq!(queue.wake_one(), None);
}

/// Contract: a queue only wakes tasks still blocked on it.
/// Given: a waiter woken directly by the scheduler, not the queue.
/// When: the queue is woken right away, and again after the task has gone
/// on to sleep.
/// Then: neither wake touches the task, and the sleep keeps its timer.
#[test]
fn waking_a_task_that_was_woken_elsewhere_is_a_no_op() {
    let _guard = common::boot();
    let queue = WaitQueue::new();
    let id = spawn(10);
    let mut boot = TrapFrame::zeroed();

    let frame = switch(&mut boot);
    assert!(queue.wait_if(|| true));
    assert!(scheduler::wake(id));
    assert_eq!(scheduler::task_state(id), Some(TaskState::Ready));

    // run it again, and let it sleep with the stale flag still set
    let frame = switch(frame);
    assert_eq!(scheduler::current_task_id(), Some(id));
    scheduler::sleep(1000).expect("sleep");
    switch(frame);
    assert_eq!(scheduler::current_task_id(), Some(scheduler::IDLE_TASK));
    assert_eq!(scheduler::task_state(id), Some(TaskState::Sleeping));

    assert_eq!(queue.wake_all(), 0);
    assert_eq!(scheduler::task_state(id), Some(TaskState::Sleeping));
    assert!(!queue.has_waiters());
    assert_eq!(scheduler::inspect(|sched| sched.timers().len()), 1);
}
