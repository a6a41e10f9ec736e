//! Task-side system call wrappers.
//!
//! Thin `Result` wrappers over the raw `ecall` helpers in [`abi`]; each
//! decodes the returned `a0` with [`decode_result`].

use super::abi;
use super::types::{decode_result, SysError, SyscallId};

/// Requests a reschedule. The caller stays ready.
#[inline(always)]
pub fn sys_yield() -> Result<(), SysError> {
    // SAFETY: tasks only run after the trap vector is installed.
    let raw = unsafe { abi::syscall0(SyscallId::Yield.number()) };
    decode_result(raw).map(|_| ())
}

/// Sleeps for at least `ticks` timer ticks.
#[inline(always)]
pub fn sys_sleep(ticks: u64) -> Result<(), SysError> {
    // SAFETY: as in `sys_yield`.
    let raw = unsafe { abi::syscall1(SyscallId::Sleep.number(), ticks) };
    decode_result(raw).map(|_| ())
}

#[inline(always)]
pub fn sys_task_id() -> Result<usize, SysError> {
    // SAFETY: as in `sys_yield`.
    let raw = unsafe { abi::syscall0(SyscallId::TaskId.number()) };
    decode_result(raw).map(|id| id as usize)
}

/// Writes `buf` to the console.
#[inline(always)]
pub fn sys_write(buf: &[u8]) -> Result<usize, SysError> {
    // SAFETY: `buf` is readable for its whole length.
    let raw = unsafe {
        abi::syscall2(
            SyscallId::Write.number(),
            buf.as_ptr() as u64,
            buf.len() as u64,
        )
    };
    decode_result(raw).map(|written| written as usize)
}

#[inline(always)]
pub fn sys_ticks() -> Result<u64, SysError> {
    // SAFETY: as in `sys_yield`.
    let raw = unsafe { abi::syscall0(SyscallId::Ticks.number()) };
    decode_result(raw)
}

/// Terminates the calling task.
#[inline(always)]
pub fn sys_exit() -> ! {
    // SAFETY: as in `sys_yield`.
    let _ = unsafe { abi::syscall0(SyscallId::Exit.number()) };
    // The pending software interrupt switches away before this runs.
    loop {
        core::hint::spin_loop();
    }
}
