//! Scheduler error paths that need a scheduler nobody has initialized.
//!
//! Runs as its own binary so the global instance is still pristine.

use core::ptr;

use xinos_kernel::scheduler::{self, Scheduler, TaskState, IDLE_TASK};

#[test]
#[should_panic(expected = "no idle task installed")]
fn reschedule_without_idle_task_is_fatal() {
    let mut sched = Scheduler::new();
    sched.reschedule(ptr::null_mut());
}

#[test]
fn fresh_scheduler_has_no_current_task() {
    let mut sched = Scheduler::new();
    assert!(!sched.has_idle_task());
    assert_eq!(sched.current(), None);
    assert!(sched.sleep_current(10).is_err());
    assert!(sched.block_current().is_err());
    assert_eq!(sched.exit_current(), None);
    assert!(!sched.wake(IDLE_TASK));
}

#[test]
fn ticks_before_init_only_count() {
    let mut sched = Scheduler::new();
    let outcome = sched.tick();
    assert!(!outcome.reschedule);
    assert_eq!(sched.ticks(), 1);
}

#[test]
fn global_scheduler_starts_without_tasks() {
    assert_eq!(scheduler::current_task_id(), None);
    assert_eq!(scheduler::task_state(IDLE_TASK), None);
    assert!(scheduler::sleep(1).is_err());
}

#[test]
fn install_idle_task_makes_the_caller_current() {
    let mut sched = Scheduler::new();
    sched.install_idle_task();

    assert!(sched.has_idle_task());
    assert_eq!(sched.current(), Some(IDLE_TASK));
    let idle = sched.task(IDLE_TASK).expect("idle");
    assert_eq!(idle.state(), TaskState::Running);
    assert!(sched.run_queue().is_empty(), "idle never sits in the run queue");
}
