//! Boot entry and the single machine-mode trap vector.
//!
//! `trap_vector` pushes a [`TrapFrame`] onto whatever stack was live when the
//! trap hit, hands its address to [`trap::dispatch`], and resumes from the
//! frame pointer the dispatcher returns. Returning a different task's frame is
//! the whole context switch: `sp` moves onto that task's stack and the
//! registers, `mepc` and `mstatus` saved there are restored before `mret`.
//!
//! [`TrapFrame`]: crate::trap::TrapFrame
//! [`trap::dispatch`]: crate::trap::dispatch

use core::arch::global_asm;

use crate::trap::{TrapFrame, TRAP_FRAME_SIZE};

global_asm!(
    ".section .text.entry",
    ".global _start",
    "_start:",
    // only hart 0 boots; the rest park
    "    csrr t0, mhartid",
    "    bnez t0, 2f",
    "    .option push",
    "    .option norelax",
    "    la gp, __global_pointer$",
    "    .option pop",
    "    la sp, __stack_top",
    "    la t0, __bss_start",
    "    la t1, __bss_end",
    "1:  bgeu t0, t1, 3f",
    "    sd zero, 0(t0)",
    "    addi t0, t0, 8",
    "    j 1b",
    "3:  call kernel_main",
    "2:  wfi",
    "    j 2b",
);

global_asm!(
    ".section .text",
    ".global trap_vector",
    ".align 4",
    "trap_vector:",
    "    addi sp, sp, -{frame}",
    "    sd x1, 8(sp)",
    "    sd x3, 24(sp)",
    "    sd x4, 32(sp)",
    "    sd x5, 40(sp)",
    "    sd x6, 48(sp)",
    "    sd x7, 56(sp)",
    "    sd x8, 64(sp)",
    "    sd x9, 72(sp)",
    "    sd x10, 80(sp)",
    "    sd x11, 88(sp)",
    "    sd x12, 96(sp)",
    "    sd x13, 104(sp)",
    "    sd x14, 112(sp)",
    "    sd x15, 120(sp)",
    "    sd x16, 128(sp)",
    "    sd x17, 136(sp)",
    "    sd x18, 144(sp)",
    "    sd x19, 152(sp)",
    "    sd x20, 160(sp)",
    "    sd x21, 168(sp)",
    "    sd x22, 176(sp)",
    "    sd x23, 184(sp)",
    "    sd x24, 192(sp)",
    "    sd x25, 200(sp)",
    "    sd x26, 208(sp)",
    "    sd x27, 216(sp)",
    "    sd x28, 224(sp)",
    "    sd x29, 232(sp)",
    "    sd x30, 240(sp)",
    "    sd x31, 248(sp)",
    "    addi t0, sp, {frame}",
    "    sd t0, 16(sp)",
    "    csrr t0, mepc",
    "    sd t0, {mepc}(sp)",
    "    csrr t0, mstatus",
    "    sd t0, {mstatus}(sp)",
    "    csrr t0, mcause",
    "    sd t0, {mcause}(sp)",
    "    csrr t0, mtval",
    "    sd t0, {mtval}(sp)",
    "    mv a0, sp",
    "    call trap_rust_dispatch",
    "    mv sp, a0",
    "    ld t0, {mepc}(sp)",
    "    csrw mepc, t0",
    "    ld t0, {mstatus}(sp)",
    "    csrw mstatus, t0",
    "    ld x1, 8(sp)",
    "    ld x3, 24(sp)",
    "    ld x4, 32(sp)",
    "    ld x5, 40(sp)",
    "    ld x6, 48(sp)",
    "    ld x7, 56(sp)",
    "    ld x8, 64(sp)",
    "    ld x9, 72(sp)",
    "    ld x10, 80(sp)",
    "    ld x11, 88(sp)",
    "    ld x12, 96(sp)",
    "    ld x13, 104(sp)",
    "    ld x14, 112(sp)",
    "    ld x15, 120(sp)",
    "    ld x16, 128(sp)",
    "    ld x17, 136(sp)",
    "    ld x18, 144(sp)",
    "    ld x19, 152(sp)",
    "    ld x20, 160(sp)",
    "    ld x21, 168(sp)",
    "    ld x22, 176(sp)",
    "    ld x23, 184(sp)",
    "    ld x24, 192(sp)",
    "    ld x25, 200(sp)",
    "    ld x26, 208(sp)",
    "    ld x27, 216(sp)",
    "    ld x28, 224(sp)",
    "    ld x29, 232(sp)",
    "    ld x30, 240(sp)",
    "    ld x31, 248(sp)",
    "    addi sp, sp, {frame}",
    "    mret",
    frame = const TRAP_FRAME_SIZE,
    mepc = const core::mem::offset_of!(TrapFrame, mepc),
    mstatus = const core::mem::offset_of!(TrapFrame, mstatus),
    mcause = const core::mem::offset_of!(TrapFrame, mcause),
    mtval = const core::mem::offset_of!(TrapFrame, mtval),
);

/// Called by `trap_vector` with interrupts masked.
///
/// # Safety
/// `frame` points at the frame `trap_vector` just pushed.
#[no_mangle]
unsafe extern "C" fn trap_rust_dispatch(frame: *mut TrapFrame) -> *mut TrapFrame {
    // SAFETY: the frame lives on the interrupted stack for the whole trap.
    crate::trap::dispatch(unsafe { &mut *frame })
}
