//! Block allocator (`malloc`/`free`) integration tests.

mod common;

use common::Region;
use proptest::prelude::*;
use xinos_kernel::memory::{
    self, BlockFlags, Heap, PageAllocator, PageFlags, ALLOCABLE_SIZE, BLOCKS_PER_PAGE,
    BLOCK_SIZE, PAGE_SIZE,
};

fn heap(region: &Region) -> Heap {
    // SAFETY: the region outlives the heap in every test below.
    Heap::new(unsafe { PageAllocator::init(region.base(), region.size()) })
}

fn page_of(addr: *mut u8) -> usize {
    addr as usize & !(PAGE_SIZE - 1)
}

#[test]
fn block_geometry() {
    assert_eq!(BLOCK_SIZE, 4);
    assert_eq!(BLOCKS_PER_PAGE, 818);
    assert_eq!(ALLOCABLE_SIZE, 3272);
}

#[test]
fn small_allocations_share_one_heap_page() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);
    let free_before = heap.pages().free_page_count();

    let a = heap.malloc(10);
    let b = heap.malloc(1);
    assert!(!a.is_null() && !b.is_null());
    assert_eq!(page_of(a), page_of(b));
    // 10 bytes round up to 3 blocks
    assert_eq!(b as usize - a as usize, 3 * BLOCK_SIZE);

    let page = page_of(a);
    assert_eq!(heap.used_blocks(page), Some(4));
    assert_eq!(heap.heap_page_count(), 1);
    assert_eq!(
        heap.block_flags(page, 0),
        Some(BlockFlags::TAKEN | BlockFlags::FIRST)
    );
    assert_eq!(
        heap.block_flags(page, 2),
        Some(BlockFlags::TAKEN | BlockFlags::LAST)
    );
    assert_eq!(heap.pages().free_page_count(), free_before - 1);

    heap.free(a);
    assert_eq!(heap.used_blocks(page), Some(1));
    heap.free(b);

    // last block gone: page handed back to the page allocator
    assert_eq!(heap.heap_page_count(), 0);
    assert_eq!(heap.pages().free_page_count(), free_before);
}

#[test]
fn freed_blocks_are_reused_first_fit() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);

    let a = heap.malloc(16);
    let b = heap.malloc(16);
    let _keep = heap.malloc(4);
    heap.free(a);

    let c = heap.malloc(8);
    assert_eq!(c, a, "hole at the page start is reused");
    let d = heap.malloc(16);
    assert!(d as usize > b as usize, "16 bytes do not fit the 8-byte leftover");
}

#[test]
fn a_full_heap_page_spills_into_a_new_one() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);

    let first = heap.malloc(ALLOCABLE_SIZE);
    let second = heap.malloc(4);
    assert_ne!(page_of(first), page_of(second));
    assert_eq!(heap.heap_page_count(), 2);
    assert_eq!(heap.used_blocks(page_of(first)), Some(BLOCKS_PER_PAGE));

    heap.free(first);
    heap.free(second);
    assert_eq!(heap.heap_page_count(), 0);
}

/// Contract: page-sized request.
/// Given: a fresh heap.
/// When: `malloc(4000)` is called and then freed.
/// Then: it occupies one whole, non-heap page, and free restores the free
/// page count.
#[test]
fn malloc_4000_takes_one_whole_page() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);
    let free_before = heap.pages().free_page_count();

    let ptr = heap.malloc(4000);
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % PAGE_SIZE, 0);
    assert_eq!(heap.heap_page_count(), 0);
    assert_eq!(heap.pages().free_page_count(), free_before - 1);

    heap.free(ptr);
    assert_eq!(heap.pages().free_page_count(), free_before);
}

#[test]
fn large_allocation_with_block_remainder_is_fully_reclaimed() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);
    let free_before = heap.pages().free_page_count();

    // one whole page plus 1904 bytes in blocks of a tail page
    let ptr = heap.malloc(6000);
    assert!(!ptr.is_null());
    let pages = heap.pages();
    let first = pages.page_index(ptr as usize).expect("managed");
    assert_eq!(pages.page_flags(first), PageFlags::TAKEN | PageFlags::FIRST);
    assert_eq!(
        pages.page_flags(first + 1),
        PageFlags::TAKEN | PageFlags::LAST | PageFlags::HEAP
    );
    let tail = pages.page_address(first + 1);
    assert_eq!(heap.used_blocks(tail), Some(1904 / BLOCK_SIZE));
    assert_eq!(heap.pages().free_page_count(), free_before - 2);

    // the allocation is contiguous and writable across the page boundary
    // SAFETY: 6000 bytes were just handed out at `ptr`.
    unsafe { core::ptr::write_bytes(ptr, 0xa5, 6000) };

    heap.free(ptr);
    assert_eq!(heap.pages().free_page_count(), free_before);
    assert_eq!(heap.heap_page_count(), 0);
}

#[test]
fn large_remainder_above_block_capacity_rounds_up_to_pages() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);
    let free_before = heap.pages().free_page_count();

    let ptr = heap.malloc(PAGE_SIZE + ALLOCABLE_SIZE + 1);
    assert_eq!(heap.heap_page_count(), 0);
    assert_eq!(heap.pages().free_page_count(), free_before - 2);
    heap.free(ptr);

    let exact = heap.malloc(3 * PAGE_SIZE);
    assert_eq!(heap.pages().free_page_count(), free_before - 3);
    heap.free(exact);
    assert_eq!(heap.pages().free_page_count(), free_before);
}

#[test]
fn zero_size_and_exhaustion_return_null() {
    let region = Region::new(4 * PAGE_SIZE);
    let mut heap = heap(&region);

    assert!(heap.malloc(0).is_null());
    assert!(heap.malloc(64 * PAGE_SIZE).is_null());
    heap.free(core::ptr::null_mut());
}

#[test]
fn page_free_refuses_heap_pages() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);

    let small = heap.malloc(32);
    assert!(!heap.free_pages(page_of(small) as *mut u8));
    assert_eq!(heap.heap_page_count(), 1);
    heap.free(small);
}

#[test]
fn free_ignores_pointers_inside_an_allocation() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);

    let small = heap.malloc(32);
    heap.free(small.wrapping_add(BLOCK_SIZE));
    assert_eq!(heap.used_blocks(page_of(small)), Some(8));

    let page = heap.malloc(PAGE_SIZE);
    let free_before = heap.pages().free_page_count();
    heap.free(page.wrapping_add(16));
    assert_eq!(heap.pages().free_page_count(), free_before);
}

/// Contract: the block-managed tail of a page run belongs to the run.
/// Given: a live 6000-byte allocation (one page plus a block tail).
/// When: the tail page address is freed on its own, then a small request
/// follows.
/// Then: the tail stays allocated, the small block lands outside the run,
/// and freeing the run start later leaves the small block alone.
#[test]
fn free_ignores_the_tail_page_of_a_live_run() {
    let region = Region::new(16 * PAGE_SIZE);
    let mut heap = heap(&region);

    let big = heap.malloc(6000);
    let tail = big as usize + PAGE_SIZE;
    let free_before = heap.pages().free_page_count();

    heap.free(tail as *mut u8);
    assert_eq!(heap.pages().free_page_count(), free_before);
    assert_eq!(heap.used_blocks(tail), Some((6000 - PAGE_SIZE).div_ceil(BLOCK_SIZE)));

    let small = heap.malloc(4);
    let small_addr = small as usize;
    assert!(
        !(big as usize..big as usize + 6000).contains(&small_addr),
        "small block {:#x} placed inside the live run",
        small_addr
    );

    heap.free(big);
    assert_eq!(heap.used_blocks(page_of(small)), Some(1));
    heap.free(small);
    assert_eq!(heap.heap_page_count(), 0);
}

#[test]
#[should_panic(expected = "outside managed range")]
fn free_outside_the_heap_panics() {
    let region = Region::new(8 * PAGE_SIZE);
    let mut heap = heap(&region);
    let mut local = 0u8;
    heap.free(&mut local);
}

#[test]
fn global_allocator_round_trip() {
    let _guard = common::boot();
    let free_before = memory::free_page_count();

    let small = memory::malloc(100);
    let pages = memory::alloc_pages(2).expect("two pages");
    assert!(!small.is_null());
    assert!(memory::free_page_count() < free_before);

    assert!(memory::free_pages(pages.as_ptr()));
    memory::free(small);
    assert_eq!(memory::free_page_count(), free_before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Allocating and immediately freeing never loses free space.
    #[test]
    fn alloc_then_free_is_idempotent(sizes in prop::collection::vec(1usize..3 * PAGE_SIZE, 1..30)) {
        let region = Region::new(32 * PAGE_SIZE);
        let mut heap = heap(&region);
        // a long-lived neighbour keeps one heap page around
        let anchor = heap.malloc(24);
        let anchor_page = page_of(anchor);
        let pages_before = heap.pages().free_page_count();
        let blocks_before = heap.used_blocks(anchor_page);

        for size in sizes {
            let ptr = heap.malloc(size);
            prop_assert!(!ptr.is_null());
            heap.free(ptr);
            prop_assert_eq!(heap.pages().free_page_count(), pages_before);
            prop_assert_eq!(heap.used_blocks(anchor_page), blocks_before);
        }
    }
}
