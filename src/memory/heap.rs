/*
 * Kernel Heap Allocator
 *
 * Dynamic memory allocation for the kernel using the linked_list_allocator
 * crate over a fixed static region. Box, Vec, and friends work after
 * init() runs.
 *
 * This kernel runs on the flat boot mapping, so the heap is simply a
 * reserved .bss region; no page tables are touched.
 *
 * ERROR HANDLING:
 * - Allocation failures trigger a kernel panic (alloc_error_handler),
 *   appropriate for kernel code where OOM is fatal
 * - Containers touched from the timer interrupt reserve their capacity up
 *   front instead (see thread::init); the interrupt path must never reach
 *   this allocator, whose lock it could find already held
 */

use linked_list_allocator::LockedHeap;

/// Size of the kernel heap in bytes.
pub const HEAP_SIZE: usize = 256 * 1024;

/// The heap region itself, carved out of .bss.
///
/// Never take a reference to this static; the allocator owns it after
/// init() and all access goes through raw pointers.
static mut HEAP_SPACE: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Global allocator instance used by Rust's allocation APIs.
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap over the static region.
///
/// Must be called exactly once during boot, before the first allocation.
pub fn init() {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_SPACE) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log::info!("Kernel heap initialized ({} KiB)", HEAP_SIZE / 1024);
}

/// Allocation error handler (required when using a global allocator in no_std)
#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("Kernel heap allocation failed: {:?}", layout);
}
