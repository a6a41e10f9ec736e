//! Sub-page block allocator (`malloc`/`free`).
//!
//! Small requests are carved out of "heap pages": ordinary pages whose
//! descriptor carries [`PageFlags::HEAP`] and whose tail holds a block table.
//!
//! ```text
//!  page + 0                                  page + 3272        page + 4092
//!  ┌─────────────────────────────────────────┬─────────────────┬──┬────────┐
//!  │ 818 blocks x 4 bytes                    │ 818 block flags │  │ header │
//!  └─────────────────────────────────────────┴─────────────────┴──┴────────┘
//!                                                                  used: u16
//! ```
//!
//! Requests are served in three regimes:
//!
//! 1. `size <= ALLOCABLE_SIZE`: first-fit block run in the first heap page
//!    that has room, else a freshly claimed page.
//! 2. `size <= PAGE_SIZE`: one whole page.
//! 3. larger: a page run; a remainder that fits the block regime goes into
//!    blocks at the start of one extra tail page, so the allocation stays
//!    contiguous.

use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use bitflags::bitflags;
use static_assertions::const_assert;

use super::page::{PageAllocator, PageFlags, PAGE_SIZE};

pub const BLOCK_SIZE: usize = 4;

#[repr(C)]
struct HeapPageHeader {
    used_blocks: u16,
    _reserved: u16,
}

const HEADER_SIZE: usize = size_of::<HeapPageHeader>();

pub const BLOCKS_PER_PAGE: usize = (PAGE_SIZE - HEADER_SIZE) / (BLOCK_SIZE + 1);

/// Largest request served from blocks inside a single heap page.
pub const ALLOCABLE_SIZE: usize = BLOCKS_PER_PAGE * BLOCK_SIZE;

const TABLE_OFFSET: usize = ALLOCABLE_SIZE;
const HEADER_OFFSET: usize = PAGE_SIZE - HEADER_SIZE;

const_assert!(TABLE_OFFSET + BLOCKS_PER_PAGE <= HEADER_OFFSET);
const_assert!(HEADER_OFFSET % align_of::<HeapPageHeader>() == 0);
const_assert!(BLOCKS_PER_PAGE <= u16::MAX as usize);

bitflags! {
    /// Block descriptor flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        const TAKEN = 1 << 0;
        const FIRST = 1 << 1;
        const LAST = 1 << 2;
    }
}

/// View of the block table at the tail of one heap page.
struct BlockTable {
    page: usize,
}

impl BlockTable {
    /// # Safety
    /// `page` must be a page-aligned page owned by the heap.
    unsafe fn new(page: usize) -> Self {
        debug_assert!(page % PAGE_SIZE == 0);
        Self { page }
    }

    fn flags(&self, block: usize) -> BlockFlags {
        debug_assert!(block < BLOCKS_PER_PAGE);
        // SAFETY: `new` guarantees the page; the table lies inside it.
        BlockFlags::from_bits_retain(unsafe {
            ptr::read((self.page + TABLE_OFFSET + block) as *const u8)
        })
    }

    fn set_flags(&mut self, block: usize, flags: BlockFlags) {
        debug_assert!(block < BLOCKS_PER_PAGE);
        // SAFETY: see `flags`.
        unsafe { ptr::write((self.page + TABLE_OFFSET + block) as *mut u8, flags.bits()) };
    }

    fn header(&self) -> *mut HeapPageHeader {
        (self.page + HEADER_OFFSET) as *mut HeapPageHeader
    }

    fn used(&self) -> u16 {
        // SAFETY: header is in-page and aligned (checked at compile time).
        unsafe { (*self.header()).used_blocks }
    }

    fn set_used(&mut self, used: u16) {
        // SAFETY: see `used`.
        unsafe { (*self.header()).used_blocks = used };
    }

    /// Zero the table and the usage counter.
    fn clear(&mut self) {
        // SAFETY: table and header are in-page.
        unsafe {
            ptr::write_bytes((self.page + TABLE_OFFSET) as *mut u8, 0, BLOCKS_PER_PAGE);
            ptr::write(
                self.header(),
                HeapPageHeader {
                    used_blocks: 0,
                    _reserved: 0,
                },
            );
        }
    }

    fn find_run(&self, count: usize) -> Option<usize> {
        let mut start = 0;
        while start + count <= BLOCKS_PER_PAGE {
            match (start..start + count).find(|&b| self.flags(b).contains(BlockFlags::TAKEN)) {
                Some(taken) => start = taken + 1,
                None => return Some(start),
            }
        }
        None
    }

    fn claim(&mut self, first: usize, count: usize) -> usize {
        let last = first + count - 1;
        for block in first..=last {
            let mut flags = BlockFlags::TAKEN;
            if block == first {
                flags |= BlockFlags::FIRST;
            }
            if block == last {
                flags |= BlockFlags::LAST;
            }
            self.set_flags(block, flags);
        }
        self.set_used(self.used() + count as u16);
        self.page + first * BLOCK_SIZE
    }

    /// Release the block run starting at `first`. `None` if `first` does
    /// not start a live run.
    fn release(&mut self, first: usize) -> Option<usize> {
        if !self.flags(first).contains(BlockFlags::TAKEN | BlockFlags::FIRST) {
            return None;
        }

        let mut block = first;
        while block < BLOCKS_PER_PAGE {
            let flags = self.flags(block);
            if !flags.contains(BlockFlags::TAKEN) {
                break;
            }
            self.set_flags(block, BlockFlags::empty());
            block += 1;
            if flags.contains(BlockFlags::LAST) {
                break;
            }
        }

        let released = block - first;
        self.set_used(self.used().saturating_sub(released as u16));
        Some(released)
    }
}

pub struct Heap {
    pages: PageAllocator,
}

impl Heap {
    pub const fn empty() -> Self {
        Self {
            pages: PageAllocator::empty(),
        }
    }

    pub fn new(pages: PageAllocator) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &PageAllocator {
        &self.pages
    }

    pub fn set_tracing(&mut self, enabled: bool) {
        self.pages.set_tracing(enabled);
    }

    pub fn alloc_pages(&mut self, count: usize) -> Option<NonNull<u8>> {
        self.pages.allocate(count)
    }

    pub fn free_pages(&mut self, addr: *mut u8) -> bool {
        self.pages.free(addr)
    }

    /// Returns null on exhaustion or for `size == 0`.
    pub fn malloc(&mut self, size: usize) -> *mut u8 {
        let ptr = match size {
            0 => ptr::null_mut(),
            s if s <= ALLOCABLE_SIZE => self.alloc_blocks(s),
            s if s <= PAGE_SIZE => self.whole_pages(1),
            s => self.alloc_large(s),
        };

        if ptr.is_null() {
            log::debug!(target: "heap", "malloc({}) failed", size);
        } else {
            log::trace!(target: "heap", "malloc({}) -> {:p}", size, ptr);
        }
        ptr
    }

    /// Release memory returned by [`Heap::malloc`].
    ///
    /// # Panics
    /// If `ptr` is neither null nor inside the managed range.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let addr = ptr as usize;
        let Some(index) = self.pages.page_index(addr) else {
            let range = self.pages.allocatable_range();
            panic!(
                "heap free({:#x}): pointer outside managed range {:#x}..{:#x}",
                addr, range.start, range.end
            );
        };

        let flags = self.pages.page_flags(index);
        if flags.contains(PageFlags::HEAP) {
            self.free_blocks(index, addr);
            return;
        }

        if addr % PAGE_SIZE != 0 || !flags.contains(PageFlags::TAKEN | PageFlags::FIRST) {
            log::warn!(target: "heap", "free({:#x}): not an allocation start", addr);
            return;
        }

        let mut last = index;
        while !self.pages.page_flags(last).contains(PageFlags::LAST)
            && last + 1 < self.pages.page_count()
        {
            last += 1;
        }

        if last != index && self.pages.page_flags(last).contains(PageFlags::HEAP) {
            // Page run with a block-managed tail: end the run one page early,
            // then release the tail through the block path.
            let cap = last - 1;
            let cap_flags = self.pages.page_flags(cap);
            self.pages.set_page_flags(cap, cap_flags | PageFlags::LAST);
            self.pages.free(ptr);

            self.pages.set_page_flags(
                last,
                PageFlags::TAKEN | PageFlags::FIRST | PageFlags::LAST | PageFlags::HEAP,
            );
            self.free_blocks(last, self.pages.page_address(last));
        } else {
            self.pages.free(ptr);
        }
        log::trace!(target: "heap", "free({:#x})", addr);
    }

    /// Pages currently carved into blocks.
    pub fn heap_page_count(&self) -> usize {
        (0..self.pages.page_count())
            .filter(|&i| self.pages.page_flags(i).contains(PageFlags::HEAP))
            .count()
    }

    /// Live blocks in the heap page at `page_addr`.
    pub fn used_blocks(&self, page_addr: usize) -> Option<usize> {
        let index = self.heap_page_index(page_addr)?;
        // SAFETY: `heap_page_index` only accepts heap pages.
        let table = unsafe { BlockTable::new(self.pages.page_address(index)) };
        Some(table.used() as usize)
    }

    pub fn block_flags(&self, page_addr: usize, block: usize) -> Option<BlockFlags> {
        let index = self.heap_page_index(page_addr)?;
        if block >= BLOCKS_PER_PAGE {
            return None;
        }
        // SAFETY: `heap_page_index` only accepts heap pages.
        let table = unsafe { BlockTable::new(self.pages.page_address(index)) };
        Some(table.flags(block))
    }

    fn heap_page_index(&self, page_addr: usize) -> Option<usize> {
        let index = self.pages.page_index(page_addr)?;
        self.pages
            .page_flags(index)
            .contains(PageFlags::HEAP)
            .then_some(index)
    }

    fn whole_pages(&mut self, count: usize) -> *mut u8 {
        self.pages
            .allocate(count)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    fn alloc_blocks(&mut self, size: usize) -> *mut u8 {
        let count = size.div_ceil(BLOCK_SIZE);

        for index in 0..self.pages.page_count() {
            let flags = self.pages.page_flags(index);
            let page = self.pages.page_address(index);

            if flags.contains(PageFlags::HEAP) {
                // SAFETY: the descriptor says the heap owns this page.
                let mut table = unsafe { BlockTable::new(page) };
                if let Some(first) = table.find_run(count) {
                    return table.claim(first, count) as *mut u8;
                }
            } else if !flags.contains(PageFlags::TAKEN) {
                self.pages.set_page_flags(
                    index,
                    PageFlags::TAKEN | PageFlags::FIRST | PageFlags::LAST | PageFlags::HEAP,
                );
                // SAFETY: the page was free and is now owned by the heap.
                let mut table = unsafe { BlockTable::new(page) };
                table.clear();
                log::trace!(target: "heap", "claimed heap page {:#x}", page);
                return table.claim(0, count) as *mut u8;
            }
        }
        ptr::null_mut()
    }

    fn alloc_large(&mut self, size: usize) -> *mut u8 {
        let whole = size / PAGE_SIZE;
        let remainder = size % PAGE_SIZE;

        if remainder == 0 {
            return self.whole_pages(whole);
        }
        if remainder > ALLOCABLE_SIZE {
            return self.whole_pages(whole + 1);
        }

        let Some(run) = self.pages.allocate(whole + 1) else {
            return ptr::null_mut();
        };
        let Some(first) = self.pages.page_index(run.as_ptr() as usize) else {
            return ptr::null_mut();
        };

        let tail = first + whole;
        let tail_flags = self.pages.page_flags(tail);
        self.pages.set_page_flags(tail, tail_flags | PageFlags::HEAP);

        // SAFETY: the tail page was just allocated and marked as a heap page.
        let mut table = unsafe { BlockTable::new(self.pages.page_address(tail)) };
        table.clear();
        table.claim(0, remainder.div_ceil(BLOCK_SIZE));
        run.as_ptr()
    }

    fn free_blocks(&mut self, index: usize, addr: usize) {
        let page = self.pages.page_address(index);
        let offset = addr - page;
        if offset % BLOCK_SIZE != 0 || offset >= ALLOCABLE_SIZE {
            log::warn!(target: "heap", "free({:#x}): not a block address", addr);
            return;
        }

        let block = offset / BLOCK_SIZE;
        if block == 0 && !self.pages.page_flags(index).contains(PageFlags::FIRST) {
            // block 0 of a run's tail page is the run's remainder; it goes
            // with the run start
            log::warn!(target: "heap", "free({:#x}): inside a page run", addr);
            return;
        }

        // SAFETY: caller checked the HEAP flag for this page.
        let mut table = unsafe { BlockTable::new(page) };
        if table.release(block).is_none() {
            log::warn!(target: "heap", "free({:#x}): not the start of a block run", addr);
            return;
        }

        if table.used() == 0 {
            let flags = self.pages.page_flags(index) - PageFlags::HEAP;
            self.pages.set_page_flags(index, flags | PageFlags::FIRST);
            self.pages.free(page as *mut u8);
            log::trace!(target: "heap", "returned heap page {:#x}", page);
        }
    }
}
