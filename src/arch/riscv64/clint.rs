//! Core-local interruptor: `mtime`, `mtimecmp` and `msip`.

use super::{cpu, Mmio};

const CLINT_BASE: usize = 0x0200_0000;
const CLINT_MTIME: usize = CLINT_BASE + 0xbff8;

const fn msip(hart: usize) -> Mmio {
    Mmio::new(CLINT_BASE + 4 * hart)
}

const fn mtimecmp(hart: usize) -> Mmio {
    Mmio::new(CLINT_BASE + 0x4000 + 8 * hart)
}

/// Free-running machine timer, 10 MHz on QEMU virt.
pub fn read_time() -> u64 {
    Mmio::new(CLINT_MTIME).read_u64()
}

/// Arm the timer interrupt `interval` cycles from now.
pub fn program_next_tick(interval: u64) {
    mtimecmp(cpu::hart_id()).write_u64(read_time().wrapping_add(interval));
}

pub fn raise_software_interrupt() {
    msip(cpu::hart_id()).write_u32(1);
}

pub fn clear_software_interrupt() {
    msip(cpu::hart_id()).write_u32(0);
}
