//! Platform-level interrupt controller, machine context of the boot hart.

use super::{cpu, Mmio};

const PLIC_BASE: usize = 0x0c00_0000;

const fn priority(source: u32) -> Mmio {
    Mmio::new(PLIC_BASE + source as usize * 4)
}

const fn menable(hart: usize, word: usize) -> Mmio {
    Mmio::new(PLIC_BASE + 0x2000 + hart * 0x80 + word * 4)
}

const fn mthreshold(hart: usize) -> Mmio {
    Mmio::new(PLIC_BASE + 0x20_0000 + hart * 0x1000)
}

const fn mclaim(hart: usize) -> Mmio {
    Mmio::new(PLIC_BASE + 0x20_0004 + hart * 0x1000)
}

pub fn set_priority(source: u32, level: u32) {
    priority(source).write_u32(level & 0x7);
}

pub fn enable_source(source: u32) {
    let reg = menable(cpu::hart_id(), (source / 32) as usize);
    reg.write_u32(reg.read_u32() | 1 << (source % 32));
}

/// Sources at or below `threshold` are masked.
pub fn set_threshold(threshold: u32) {
    mthreshold(cpu::hart_id()).write_u32(threshold & 0x7);
}

/// Highest-priority pending source, or 0 when nothing is pending.
pub fn claim() -> u32 {
    mclaim(cpu::hart_id()).read_u32()
}

pub fn complete(source: u32) {
    mclaim(cpu::hart_id()).write_u32(source);
}
