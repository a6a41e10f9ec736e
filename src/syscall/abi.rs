//! Raw `ecall` helpers.

use core::arch::asm;

/// Executes a zero-argument system call.
///
/// # Safety
/// The trap vector must be installed.
#[inline(always)]
pub unsafe fn syscall0(number: u64) -> u64 {
    let ret: u64;
    // SAFETY:
    // - `ecall` traps into `trap_vector`, which restores every register but `a0`.
    // - The caller guarantees the trap vector is installed.
    unsafe {
        asm!(
            "ecall",
            in("a7") number,
            lateout("a0") ret,
            options(nostack)
        );
    }
    ret
}

/// Executes a one-argument system call.
///
/// # Safety
/// The trap vector must be installed and `arg0` valid for `number`.
#[inline(always)]
pub unsafe fn syscall1(number: u64, arg0: u64) -> u64 {
    let mut ret = arg0;
    // SAFETY: see `syscall0`.
    unsafe {
        asm!(
            "ecall",
            in("a7") number,
            inout("a0") ret,
            options(nostack)
        );
    }
    ret
}

/// Executes a two-argument system call.
///
/// # Safety
/// The trap vector must be installed and `arg0`/`arg1` valid for `number`.
#[inline(always)]
pub unsafe fn syscall2(number: u64, arg0: u64, arg1: u64) -> u64 {
    let mut ret = arg0;
    // SAFETY: see `syscall0`.
    unsafe {
        asm!(
            "ecall",
            in("a7") number,
            inout("a0") ret,
            in("a1") arg1,
            options(nostack)
        );
    }
    ret
}
