//! Shared helpers for the host integration tests.

#![allow(dead_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::{Mutex, MutexGuard, OnceLock};

use xinos_kernel::arch::hosted;
use xinos_kernel::memory::PAGE_SIZE;
use xinos_kernel::trap::{irq, TrapFrame};
use xinos_kernel::{memory, scheduler};

/// Page-aligned host memory, released on drop.
pub struct Region {
    base: *mut u8,
    layout: Layout,
}

impl Region {
    pub fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, PAGE_SIZE).expect("bad region layout");
        // SAFETY: non-zero size, valid layout.
        let base = unsafe { alloc_zeroed(layout) };
        assert!(!base.is_null(), "host allocation failed");
        Self { base, layout }
    }

    pub fn base(&self) -> usize {
        self.base as usize
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this layout.
        unsafe { dealloc(self.base, self.layout) };
    }
}

/// Size of the shared kernel heap: 256 pages plus descriptor space.
pub const KERNEL_HEAP_SIZE: usize = 260 * PAGE_SIZE;

/// Serializes tests that touch the global memory, scheduler or IRQ state.
pub fn global_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fresh global kernel state: hart, scheduler with idle, heap, IRQ table.
///
/// The heap region is leaked once per test binary so stacks of tasks left
/// over from an earlier test can still be returned to it.
pub fn boot() -> MutexGuard<'static, ()> {
    static HEAP: OnceLock<usize> = OnceLock::new();

    let guard = global_lock();
    let base = *HEAP.get_or_init(|| {
        let region = Region::new(KERNEL_HEAP_SIZE);
        let base = region.base();
        std::mem::forget(region);
        base
    });

    hosted::reset();
    scheduler::init();
    // SAFETY: the region is leaked and used for nothing but the kernel heap.
    unsafe { memory::init(base, KERNEL_HEAP_SIZE, false) };
    irq::clear_irq_handlers();
    guard
}

pub const MCAUSE_INTERRUPT: u64 = 1 << 63;

pub fn interrupt_frame(code: u64) -> TrapFrame {
    TrapFrame {
        mcause: MCAUSE_INTERRUPT | code,
        ..TrapFrame::zeroed()
    }
}

pub fn exception_frame(code: u64) -> TrapFrame {
    TrapFrame {
        mcause: code,
        ..TrapFrame::zeroed()
    }
}

pub extern "C" fn noop_task(_arg: usize) {}
