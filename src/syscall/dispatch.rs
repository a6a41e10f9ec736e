//! Kernel-side system call dispatcher (`ecall` path).
//!
//! ABI, as left in the [`TrapFrame`] by the trap entry:
//! - `a7` -> system call number
//! - `a0..a5` -> arguments
//! - `a0` <- result; negative values are error codes

use core::slice;

use crate::arch::uart;
use crate::scheduler;
use crate::trap::TrapFrame;

use super::types::{
    SyscallId, ERR_INVALID_ARG, ERR_UNSUPPORTED, SYSCALL_OK, SYSCALL_TABLE_SIZE,
};

pub type SyscallFn = fn(args: &[u64; 6]) -> i64;

const fn build_table() -> [Option<SyscallFn>; SYSCALL_TABLE_SIZE] {
    let mut table: [Option<SyscallFn>; SYSCALL_TABLE_SIZE] = [None; SYSCALL_TABLE_SIZE];
    table[SyscallId::Yield as usize] = Some(sys_yield_impl);
    table[SyscallId::Sleep as usize] = Some(sys_sleep_impl);
    table[SyscallId::Exit as usize] = Some(sys_exit_impl);
    table[SyscallId::TaskId as usize] = Some(sys_task_id_impl);
    table[SyscallId::Write as usize] = Some(sys_write_impl);
    table[SyscallId::Ticks as usize] = Some(sys_ticks_impl);
    table
}

static SYSCALL_TABLE: [Option<SyscallFn>; SYSCALL_TABLE_SIZE] = build_table();

/// Run the system call described by `frame` and store its result in `a0`.
///
/// # Panics
/// If the number is outside the table.
pub fn handle(frame: &mut TrapFrame) {
    let number = frame.syscall_number();
    let result = dispatch(number, &frame.syscall_args());
    frame.set_return_value(result);
}

/// Resolve `number` and run the handler.
pub fn dispatch(number: u64, args: &[u64; 6]) -> i64 {
    if number >= SYSCALL_TABLE_SIZE as u64 {
        panic!("syscall: number {} out of range", number);
    }

    match SYSCALL_TABLE[number as usize] {
        Some(handler) => {
            log::trace!(target: "syscall", "syscall {} args {:x?}", number, args);
            handler(args)
        }
        None => {
            log::warn!(target: "syscall", "syscall {} not implemented", number);
            ERR_UNSUPPORTED
        }
    }
}

fn sys_yield_impl(_args: &[u64; 6]) -> i64 {
    scheduler::task_yield();
    SYSCALL_OK
}

fn sys_sleep_impl(args: &[u64; 6]) -> i64 {
    match scheduler::sleep(args[0]) {
        Ok(()) => SYSCALL_OK,
        Err(err) => err.errno(),
    }
}

/// The caller is switched away from on the pending software interrupt and
/// never sees the result.
fn sys_exit_impl(_args: &[u64; 6]) -> i64 {
    match scheduler::exit_current() {
        Some(_) => SYSCALL_OK,
        None => ERR_INVALID_ARG,
    }
}

fn sys_task_id_impl(_args: &[u64; 6]) -> i64 {
    match scheduler::current_task_id() {
        Some(id) => id as i64,
        None => ERR_INVALID_ARG,
    }
}

/// `len == 0` succeeds with 0; a null buffer with a length is rejected.
fn sys_write_impl(args: &[u64; 6]) -> i64 {
    let ptr = args[0] as *const u8;
    let len = args[1] as usize;
    if len == 0 {
        return 0;
    }
    if ptr.is_null() || len > i64::MAX as usize {
        return ERR_INVALID_ARG;
    }

    // SAFETY:
    // - Tasks share the kernel address space; the caller passes a readable buffer.
    // - Null is rejected above.
    let bytes = unsafe { slice::from_raw_parts(ptr, len) };
    for &byte in bytes {
        uart::put_byte(byte);
    }
    len as i64
}

fn sys_ticks_impl(_args: &[u64; 6]) -> i64 {
    scheduler::ticks() as i64
}
