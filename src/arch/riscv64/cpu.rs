//! Machine-mode CSR access: interrupt enable, trap vector, idle.

use core::arch::asm;

/// `mstatus.MIE` - global machine interrupt enable.
const MSTATUS_MIE: usize = 1 << 3;

/// `mie` bits for the three interrupt classes the kernel uses.
const MIE_MSIE: usize = 1 << 3;
const MIE_MTIE: usize = 1 << 7;
const MIE_MEIE: usize = 1 << 11;

extern "C" {
    fn trap_vector();
}

#[inline]
pub fn interrupts_enabled() -> bool {
    let mstatus: usize;
    // SAFETY: reading mstatus has no side effects.
    unsafe { asm!("csrr {}, mstatus", out(reg) mstatus, options(nomem, nostack)) };
    mstatus & MSTATUS_MIE != 0
}

#[inline]
pub fn enable_interrupts() {
    // SAFETY: only sets MIE; the trap vector is installed before the first call.
    unsafe { asm!("csrs mstatus, {}", in(reg) MSTATUS_MIE, options(nostack)) };
}

#[inline]
pub fn disable_interrupts() {
    // SAFETY: clearing MIE only defers interrupt delivery.
    unsafe { asm!("csrc mstatus, {}", in(reg) MSTATUS_MIE, options(nostack)) };
}

/// Point `mtvec` at the direct-mode trap entry.
pub fn install_trap_vector() {
    let vector = trap_vector as usize;
    // SAFETY: `trap_vector` is 4-byte aligned (see entry.rs), so mode bits are 0.
    unsafe { asm!("csrw mtvec, {}", in(reg) vector, options(nostack)) };
}

/// Enable the software, timer and external interrupt classes in `mie`.
pub fn enable_interrupt_sources() {
    // SAFETY: delivery is still gated by mstatus.MIE.
    unsafe { asm!("csrs mie, {}", in(reg) MIE_MSIE | MIE_MTIE | MIE_MEIE, options(nostack)) };
}

#[inline]
pub fn hart_id() -> usize {
    let id: usize;
    // SAFETY: mhartid is read-only.
    unsafe { asm!("csrr {}, mhartid", out(reg) id, options(nomem, nostack)) };
    id
}

/// Current `gp`, handed to new tasks so relaxed globals keep working.
#[inline]
pub fn global_pointer() -> u64 {
    let gp: u64;
    // SAFETY: plain register move.
    unsafe { asm!("mv {}, gp", out(reg) gp, options(nomem, nostack)) };
    gp
}

#[inline]
pub fn wait_for_interrupt() {
    // SAFETY: wfi is a hint; execution resumes on any pending interrupt.
    unsafe { asm!("wfi", options(nomem, nostack)) };
}

pub fn halt() -> ! {
    disable_interrupts();
    loop {
        wait_for_interrupt();
    }
}
