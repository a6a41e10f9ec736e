//! Syscall dispatcher integration tests.

mod common;

use std::ptr::addr_of_mut;

use common::{exception_frame, interrupt_frame, noop_task};
use xinos_kernel::arch::{clint, uart};
use xinos_kernel::scheduler::{self, TaskState, IDLE_TASK};
use xinos_kernel::syscall::{
    self, decode_result, SysError, SyscallId, ERR_INVALID_ARG, ERR_UNSUPPORTED,
    SYSCALL_TABLE_SIZE,
};
use xinos_kernel::trap::frame::{REG_A0, REG_A7};
use xinos_kernel::trap::{self, TrapFrame};

const ECALL_MACHINE: u64 = 11;
const ECALL_USER: u64 = 8;

fn ecall(number: SyscallId, args: &[u64]) -> TrapFrame {
    let mut frame = exception_frame(ECALL_MACHINE);
    frame.regs[REG_A7] = number.number();
    frame.regs[REG_A0..REG_A0 + args.len()].copy_from_slice(args);
    frame
}

#[test]
fn syscall_ids_are_stable() {
    assert_eq!(SyscallId::Yield.number(), 0);
    assert_eq!(SyscallId::Sleep.number(), 1);
    assert_eq!(SyscallId::Exit.number(), 2);
    assert_eq!(SyscallId::TaskId.number(), 3);
    assert_eq!(SyscallId::Write.number(), 4);
    assert_eq!(SyscallId::Ticks.number(), 5);

    assert_eq!(SyscallId::try_from(4), Ok(SyscallId::Write));
    assert_eq!(SyscallId::try_from(6), Err(SysError::UnsupportedSyscall));
}

#[test]
fn decode_result_maps_known_errors() {
    assert_eq!(decode_result(7), Ok(7));
    assert_eq!(
        decode_result(ERR_UNSUPPORTED as u64),
        Err(SysError::UnsupportedSyscall)
    );
    assert_eq!(
        decode_result(ERR_INVALID_ARG as u64),
        Err(SysError::InvalidArgument)
    );
    assert_eq!(decode_result(-5i64 as u64), Err(SysError::Unknown(-5)));
    assert_eq!(SysError::TryAgain.code(), -11);
}

#[test]
fn empty_table_slots_are_unsupported() {
    let _guard = common::boot();
    for number in SyscallId::ALL.len() as u64..SYSCALL_TABLE_SIZE as u64 {
        assert_eq!(syscall::dispatch(number, &[0; 6]), ERR_UNSUPPORTED);
    }
}

#[test]
#[should_panic(expected = "syscall: number 8 out of range")]
fn number_beyond_the_table_is_fatal() {
    syscall::dispatch(SYSCALL_TABLE_SIZE as u64, &[0; 6]);
}

#[test]
fn write_copies_the_buffer_to_the_console() {
    let _guard = common::boot();
    let text = b"hello, hart\n";

    let mut frame = ecall(
        SyscallId::Write,
        &[text.as_ptr() as u64, text.len() as u64],
    );
    frame.mepc = 0x8000_0400;
    trap::dispatch(&mut frame);

    assert_eq!(frame.return_value(), text.len() as i64);
    assert_eq!(frame.mepc, 0x8000_0404);
    assert_eq!(uart::take_output(), text);
}

#[test]
fn write_rejects_null_and_accepts_empty() {
    let _guard = common::boot();

    assert_eq!(
        syscall::dispatch(SyscallId::Write.number(), &[0, 3, 0, 0, 0, 0]),
        ERR_INVALID_ARG
    );
    assert_eq!(
        syscall::dispatch(SyscallId::Write.number(), &[0, 0, 0, 0, 0, 0]),
        0
    );
    assert!(uart::take_output().is_empty());
}

#[test]
fn user_mode_ecall_is_routed_the_same_way() {
    let _guard = common::boot();
    let mut frame = ecall(SyscallId::TaskId, &[]);
    frame.mcause = ECALL_USER;

    trap::dispatch(&mut frame);
    assert_eq!(frame.return_value(), IDLE_TASK as i64);
    assert_eq!(frame.mepc, 4);
}

#[test]
fn ticks_reports_the_tick_counter() {
    let _guard = common::boot();
    let mut timer = interrupt_frame(7);
    for _ in 0..3 {
        trap::dispatch(&mut timer);
    }

    let mut frame = ecall(SyscallId::Ticks, &[]);
    trap::dispatch(&mut frame);
    assert_eq!(decode_result(frame.return_value() as u64), Ok(3));
}

#[test]
fn idle_cannot_sleep_or_exit() {
    let _guard = common::boot();
    assert_eq!(
        syscall::dispatch(SyscallId::Sleep.number(), &[10, 0, 0, 0, 0, 0]),
        ERR_INVALID_ARG
    );
    assert_eq!(
        syscall::dispatch(SyscallId::Exit.number(), &[0; 6]),
        ERR_INVALID_ARG
    );
    assert_eq!(scheduler::task_state(IDLE_TASK), Some(TaskState::Running));
}

#[test]
fn yield_raises_the_software_interrupt() {
    let _guard = common::boot();
    let before = clint::software_interrupts_raised();

    assert_eq!(syscall::dispatch(SyscallId::Yield.number(), &[0; 6]), 0);
    assert!(clint::software_interrupt_pending());
    assert_eq!(clint::software_interrupts_raised(), before + 1);
}

/// Contract: sleep suspends the caller for the requested ticks.
/// Given: one task switched in from idle.
/// When: it calls sleep(5) and five timer interrupts follow.
/// Then: the task is Sleeping until the fifth tick, which switches back to it.
#[test]
fn sleep_syscall_parks_the_task_until_its_deadline() {
    let _guard = common::boot();
    let id = scheduler::task_create(noop_task, 0, 20, 10).expect("task");

    let mut boot = interrupt_frame(3);
    // SAFETY: the frame lives on the task's heap stack.
    let frame = unsafe { &mut *trap::dispatch(&mut boot) };
    assert_eq!(scheduler::current_task_id(), Some(id));

    frame.mcause = ECALL_MACHINE;
    frame.regs[REG_A7] = SyscallId::Sleep.number();
    frame.regs[REG_A0] = 5;
    trap::dispatch(frame);
    assert_eq!(frame.return_value(), 0);
    assert_eq!(scheduler::task_state(id), Some(TaskState::Sleeping));
    assert!(clint::software_interrupt_pending());

    *frame = interrupt_frame(3);
    assert_eq!(trap::dispatch(frame), addr_of_mut!(boot));

    boot = interrupt_frame(7);
    for _ in 0..4 {
        assert_eq!(trap::dispatch(&mut boot), addr_of_mut!(boot));
        assert_eq!(scheduler::task_state(id), Some(TaskState::Sleeping));
    }
    let resumed = trap::dispatch(&mut boot);
    assert_eq!(resumed, frame as *mut TrapFrame);
    assert_eq!(scheduler::current_task_id(), Some(id));
}
