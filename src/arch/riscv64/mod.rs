//! RISC-V 64 machine-mode backend for the QEMU `virt` board.

pub mod clint;
pub mod cpu;
mod entry;
pub mod plic;
pub mod uart;

/// Volatile MMIO register access.
#[derive(Clone, Copy)]
pub(crate) struct Mmio {
    addr: usize,
}

impl Mmio {
    pub(crate) const fn new(addr: usize) -> Self {
        Self { addr }
    }

    #[inline]
    pub(crate) fn read_u8(self) -> u8 {
        // SAFETY: addresses are fixed device registers of the virt board.
        unsafe { core::ptr::read_volatile(self.addr as *const u8) }
    }

    #[inline]
    pub(crate) fn write_u8(self, value: u8) {
        // SAFETY: see `read_u8`.
        unsafe { core::ptr::write_volatile(self.addr as *mut u8, value) }
    }

    #[inline]
    pub(crate) fn read_u32(self) -> u32 {
        // SAFETY: see `read_u8`; all 32-bit registers are naturally aligned.
        unsafe { core::ptr::read_volatile(self.addr as *const u32) }
    }

    #[inline]
    pub(crate) fn write_u32(self, value: u32) {
        // SAFETY: see `read_u32`.
        unsafe { core::ptr::write_volatile(self.addr as *mut u32, value) }
    }

    #[inline]
    pub(crate) fn read_u64(self) -> u64 {
        // SAFETY: CLINT 64-bit registers are 8-byte aligned.
        unsafe { core::ptr::read_volatile(self.addr as *const u64) }
    }

    #[inline]
    pub(crate) fn write_u64(self, value: u64) {
        // SAFETY: see `read_u64`.
        unsafe { core::ptr::write_volatile(self.addr as *mut u64, value) }
    }
}
