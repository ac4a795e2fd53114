/*
 * Thread Page Pool
 *
 * Bitmap-based allocator for 4 KiB pages over a static arena.
 *
 * Every kernel thread owns exactly one page from this pool for the whole
 * of its life: the thread control block sits at the low end and the stack
 * grows down from the high end. The page comes back to the pool when the
 * scheduler reaps the thread after it dies.
 *
 * IMPORTANT: we never take & or &mut to the arena static; pages are only
 * touched via raw pointers obtained from `addr_of_mut!`.
 */

use core::ptr::NonNull;

use spin::Mutex;

use crate::arch::x86_64::interrupts;

/// Page size in bytes. A page must hold a TCB plus a usable stack.
pub const PGSIZE: usize = 4096;

/// Number of pages in the pool, which bounds the number of live threads.
pub const POOL_PAGES: usize = 64;

#[repr(C, align(4096))]
struct Arena([u8; POOL_PAGES * PGSIZE]);

static mut ARENA: Arena = Arena([0; POOL_PAGES * PGSIZE]);

/// Allocation state: one bit per page, plus counters for diagnostics.
struct Pool {
    used: u64,
    in_use: usize,
    total_allocs: u64,
    total_frees: u64,
}

// One u64 of bitmap covers the whole pool
const _: () = assert!(POOL_PAGES <= 64);

static POOL: Mutex<Pool> = Mutex::new(Pool {
    used: 0,
    in_use: 0,
    total_allocs: 0,
    total_frees: 0,
});

fn arena_base() -> *mut u8 {
    core::ptr::addr_of_mut!(ARENA) as *mut u8
}

pub fn init() {
    let pool = POOL.lock();
    assert!(pool.used == 0, "page pool initialized twice");
    log::info!(
        "Page pool: {} pages of {} bytes at {:p}",
        POOL_PAGES,
        PGSIZE,
        arena_base()
    );
}

/// Allocate one zeroed, page-aligned page.
///
/// Returns None when the pool is exhausted; the caller reports the
/// failure, nothing panics here.
///
/// The pool lock is only ever held with interrupts off: the scheduler
/// frees pages inside its interrupts-off critical section, and it must
/// never spin on a lock a preempted allocator still holds.
pub fn alloc() -> Option<NonNull<u8>> {
    let old = interrupts::disable();
    let idx = {
        let mut pool = POOL.lock();
        let idx = (0..POOL_PAGES).find(|&i| pool.used & (1u64 << i) == 0);
        if let Some(idx) = idx {
            pool.used |= 1 << idx;
            pool.in_use += 1;
            pool.total_allocs += 1;
        }
        idx
    };
    interrupts::set_level(old);
    let idx = idx?;

    let page = unsafe { arena_base().add(idx * PGSIZE) };
    // Zero it; the previous owner's stack is still written here
    unsafe { core::ptr::write_bytes(page, 0, PGSIZE) };
    NonNull::new(page)
}

/// Return a page to the pool.
///
/// The pointer must be one previously handed out by `alloc` and still
/// outstanding; anything else is a kernel bug.
pub fn free(page: NonNull<u8>) {
    let addr = page.as_ptr() as usize;
    let base = arena_base() as usize;
    assert!(addr % PGSIZE == 0, "freed pointer is not page-aligned");
    assert!(
        addr >= base && addr < base + POOL_PAGES * PGSIZE,
        "freed pointer is outside the page pool"
    );
    let idx = (addr - base) / PGSIZE;

    let old = interrupts::disable();
    {
        let mut pool = POOL.lock();
        assert!(pool.used & (1u64 << idx) != 0, "page double free");
        pool.used &= !(1 << idx);
        pool.in_use -= 1;
        pool.total_frees += 1;
    }
    interrupts::set_level(old);
}

/// Pages currently handed out.
pub fn in_use() -> usize {
    let old = interrupts::disable();
    let n = POOL.lock().in_use;
    interrupts::set_level(old);
    n
}

/// Lifetime (allocations, frees) counters.
pub fn stats() -> (u64, u64) {
    let old = interrupts::disable();
    let counts = {
        let pool = POOL.lock();
        (pool.total_allocs, pool.total_frees)
    };
    interrupts::set_level(old);
    counts
}
