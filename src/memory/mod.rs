//! Physical memory: page runs and sub-page blocks.
//!
//! One global [`Heap`] (which owns the [`PageAllocator`]) serves both
//! allocator faces: `alloc_pages`/`free_pages` for whole runs and
//! `malloc`/`free` for arbitrary sizes.

pub mod heap;
pub mod page;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

pub use heap::{BlockFlags, Heap, ALLOCABLE_SIZE, BLOCKS_PER_PAGE, BLOCK_SIZE};
pub use page::{align_up, PageAllocator, PageFlags, PAGE_SIZE};

use crate::sync::SpinLock;

struct GlobalMemory {
    inner: SpinLock<Heap>,
    initialized: AtomicBool,
}

impl GlobalMemory {
    const fn new() -> Self {
        Self {
            inner: SpinLock::new(Heap::empty()),
            initialized: AtomicBool::new(false),
        }
    }
}

static MEMORY: GlobalMemory = GlobalMemory::new();

/// Hand `heap_base..heap_base + heap_size` to the global allocator.
///
/// Calling it again discards all previous allocations.
///
/// # Safety
/// See [`PageAllocator::init`].
pub unsafe fn init(heap_base: usize, heap_size: usize, trace_allocations: bool) {
    // SAFETY: forwarded from the caller.
    let mut pages = unsafe { PageAllocator::init(heap_base, heap_size) };
    pages.set_tracing(trace_allocations);

    let range = pages.allocatable_range();
    log::info!(
        target: "page",
        "managing {} pages at {:#x}..{:#x}",
        pages.page_count(),
        range.start,
        range.end
    );

    *MEMORY.inner.lock() = Heap::new(pages);
    MEMORY.initialized.store(true, Ordering::Release);
}

pub fn is_initialized() -> bool {
    MEMORY.initialized.load(Ordering::Acquire)
}

/// Executes a closure with the global heap, interrupts masked.
pub fn with_memory<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    debug_assert!(is_initialized(), "memory not initialized");
    let mut guard = MEMORY.inner.lock();
    f(&mut guard)
}

pub fn alloc_pages(count: usize) -> Option<NonNull<u8>> {
    with_memory(|heap| heap.alloc_pages(count))
}

pub fn free_pages(addr: *mut u8) -> bool {
    with_memory(|heap| heap.free_pages(addr))
}

pub fn malloc(size: usize) -> *mut u8 {
    with_memory(|heap| heap.malloc(size))
}

pub fn free(ptr: *mut u8) {
    with_memory(|heap| heap.free(ptr))
}

pub fn free_page_count() -> usize {
    with_memory(|heap| heap.pages().free_page_count())
}
