/*
                    PAGE ALLOCATOR LAYOUT
    ═══════════════════════════════════════════════════════════════════

    heap_base  ┌─────────────────────────────────────────────────────┐
               │  Page descriptors, one byte per managed page        │
               │  ┌─────────────────────────────────────────────┐    │
               │  │ [0] TAKEN | FIRST                           │    │
               │  │ [1] TAKEN                                   │    │
               │  │ [2] TAKEN | LAST                            │    │
               │  │ [3] -                                       │    │
               │  │ [4] TAKEN | FIRST | LAST | HEAP             │    │
               │  │ ...                                         │    │
               │  └─────────────────────────────────────────────┘    │
               │            (padding to 4 KiB alignment)             │
   alloc_start ├═════════════════════════════════════════════════════┤
               │  page 0                                             │
               ├─────────────────────────────────────────────────────┤
               │  page 1                                             │
               ├─────────────────────────────────────────────────────┤
               │  ...                                                │
               ├─────────────────────────────────────────────────────┤
               │  page N-1                                           │
     alloc_end └─────────────────────────────────────────────────────┘

    A run is the pages from a FIRST descriptor up to and including the
    next LAST descriptor; every page of a run is TAKEN. HEAP marks a page
    that the block allocator has carved into 4-byte blocks.
*/

//! First-fit allocator for contiguous page runs.

use core::ops::Range;
use core::ptr::NonNull;

use bitflags::bitflags;

pub const PAGE_SIZE: usize = 4096;

bitflags! {
    /// Page descriptor flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const TAKEN = 1 << 0;
        const FIRST = 1 << 1;
        const LAST = 1 << 2;
        /// Owned by the block allocator.
        const HEAP = 1 << 3;
    }
}

#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

pub struct PageAllocator {
    descriptors: usize,
    alloc_start: usize,
    pages: usize,
    tracing: bool,
}

impl PageAllocator {
    /// Allocator that manages nothing; every allocation fails.
    pub const fn empty() -> Self {
        Self {
            descriptors: 0,
            alloc_start: 0,
            pages: 0,
            tracing: false,
        }
    }

    /// Take over `heap_base..heap_base + heap_size`.
    ///
    /// The leading bytes hold one descriptor per managed page; the managed
    /// pages start at the first page boundary after them.
    ///
    /// # Safety
    /// The region must be valid, writable, and not used by anything else for
    /// as long as the allocator (or memory handed out by it) is alive.
    pub unsafe fn init(heap_base: usize, heap_size: usize) -> Self {
        let Some(end) = heap_base.checked_add(heap_size) else {
            return Self::empty();
        };

        // Largest page count whose descriptors plus pages still fit.
        let mut pages = heap_size / (PAGE_SIZE + 1);
        while pages > 0 && align_up(heap_base + pages, PAGE_SIZE) + pages * PAGE_SIZE > end {
            pages -= 1;
        }

        // SAFETY: the caller hands us the region; `pages` bytes at its start
        // are descriptors.
        unsafe { core::ptr::write_bytes(heap_base as *mut u8, 0, pages) };

        Self {
            descriptors: heap_base,
            alloc_start: align_up(heap_base + pages, PAGE_SIZE),
            pages,
            tracing: false,
        }
    }

    pub fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn allocatable_range(&self) -> Range<usize> {
        self.alloc_start..self.alloc_start + self.pages * PAGE_SIZE
    }

    /// Descriptor index of the page containing `addr`.
    pub fn page_index(&self, addr: usize) -> Option<usize> {
        self.allocatable_range()
            .contains(&addr)
            .then(|| (addr - self.alloc_start) / PAGE_SIZE)
    }

    pub fn page_address(&self, index: usize) -> usize {
        self.alloc_start + index * PAGE_SIZE
    }

    pub fn page_flags(&self, index: usize) -> PageFlags {
        if index >= self.pages {
            return PageFlags::empty();
        }
        // SAFETY: index is within the descriptor array written by `init`.
        PageFlags::from_bits_retain(unsafe { *(self.descriptors as *const u8).add(index) })
    }

    pub(crate) fn set_page_flags(&mut self, index: usize, flags: PageFlags) {
        debug_assert!(index < self.pages);
        // SAFETY: see `page_flags`.
        unsafe { *(self.descriptors as *mut u8).add(index) = flags.bits() };
    }

    pub fn free_page_count(&self) -> usize {
        (0..self.pages)
            .filter(|&i| !self.page_flags(i).contains(PageFlags::TAKEN))
            .count()
    }

    /// First-fit allocation of `count` contiguous pages.
    pub fn allocate(&mut self, count: usize) -> Option<NonNull<u8>> {
        if count == 0 || count > self.pages {
            return None;
        }

        let Some(first) = self.find_free_run(count) else {
            if self.tracing {
                log::trace!(target: "page", "allocate({}): no free run", count);
            }
            return None;
        };

        let last = first + count - 1;
        for index in first..=last {
            let mut flags = PageFlags::TAKEN;
            if index == first {
                flags |= PageFlags::FIRST;
            }
            if index == last {
                flags |= PageFlags::LAST;
            }
            self.set_page_flags(index, flags);
        }

        let addr = self.page_address(first);
        if self.tracing {
            log::trace!(target: "page", "allocate({}) -> {:#x}", count, addr);
        }
        NonNull::new(addr as *mut u8)
    }

    /// Release the run starting at `addr`.
    ///
    /// Anything other than the start of a live run is rejected and leaves
    /// every descriptor untouched. Pages owned by the block allocator must be
    /// released through it.
    pub fn free(&mut self, addr: *mut u8) -> bool {
        let addr = addr as usize;
        let Some(index) = self.page_index(addr) else {
            log::warn!(target: "page", "free({:#x}): outside managed range", addr);
            return false;
        };

        let flags = self.page_flags(index);
        if addr % PAGE_SIZE != 0 || !flags.contains(PageFlags::TAKEN | PageFlags::FIRST) {
            log::warn!(target: "page", "free({:#x}): not the start of a run", addr);
            return false;
        }
        if flags.contains(PageFlags::HEAP) {
            log::warn!(target: "page", "free({:#x}): page belongs to the heap", addr);
            return false;
        }

        let released = self.release_run(index);
        if self.tracing {
            log::trace!(target: "page", "free({:#x}): released {} pages", addr, released);
        }
        true
    }

    /// Clear descriptors from `first` through the next LAST. Returns the
    /// number of pages released.
    pub(crate) fn release_run(&mut self, first: usize) -> usize {
        let mut index = first;
        while index < self.pages {
            let flags = self.page_flags(index);
            if !flags.contains(PageFlags::TAKEN) {
                break;
            }
            self.set_page_flags(index, PageFlags::empty());
            index += 1;
            if flags.contains(PageFlags::LAST) {
                break;
            }
        }
        index - first
    }

    fn find_free_run(&self, count: usize) -> Option<usize> {
        let mut start = 0;
        while start + count <= self.pages {
            match (start..start + count).find(|&i| self.page_flags(i).contains(PageFlags::TAKEN)) {
                Some(taken) => start = taken + 1,
                None => return Some(start),
            }
        }
        None
    }
}

