/*
 * Memory Management
 *
 * High-level module that ties together:
 *  - Page pool (page): 4 KiB pages, one per thread
 *  - Kernel heap (heap): backs alloc (Vec, VecDeque, String)
 */

pub mod heap;
pub mod page;

pub use page::PGSIZE;

/// Top-level memory initialization:
///  1. Kernel heap
///  2. Thread page pool
pub fn init() {
    log::info!("Initializing memory management...");

    heap::init();
    page::init();

    log::info!(
        "Memory: heap {} KiB, page pool {} pages",
        heap::HEAP_SIZE / 1024,
        page::POOL_PAGES
    );
}
