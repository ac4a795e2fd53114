/*
 * Lifecycle and Accounting Scenarios
 *
 * The unglamorous guarantees: every dead thread's page goes back to the
 * pool exactly once, pool exhaustion is a reported error rather than a
 * crash, and the idle thread actually absorbs idle time.
 */

use super::check;
use crate::drivers::timer;
use crate::memory::page;
use crate::sync::Semaphore;
use crate::thread::{self, Priority, SpawnError};

/// Pages of exited threads return to the pool once the scheduler has
/// reaped them.
pub fn pages_reclaimed() -> Result<(), &'static str> {
    static DONE: Semaphore = Semaphore::new(0);

    fn worker(_aux: usize) {
        DONE.up();
    }

    let before = page::in_use();
    let (allocs_before, _) = page::stats();

    for _ in 0..8 {
        thread::spawn("worker", Priority(32), worker, 0).map_err(|_| "spawn failed")?;
    }
    for _ in 0..8 {
        DONE.down();
    }

    // The last corpse is reaped by the next scheduler pass
    thread::yield_now();

    let (allocs_after, frees_after) = page::stats();
    check(page::in_use() == before, "exited threads leaked their pages")?;
    check(
        allocs_after - allocs_before == 8 && allocs_after - frees_after == before as u64,
        "page alloc/free accounting is off",
    )
}

/// Spawning past the pool reports OutOfPages and leaves no partial
/// thread behind; the pool recovers once the backlog exits.
pub fn spawn_exhaustion() -> Result<(), &'static str> {
    fn noop(_aux: usize) {}

    let before = page::in_use();
    let mut spawned = 0usize;

    // Lower priority than the driver, so they hold their pages without
    // running until we let them
    let err = loop {
        match thread::spawn("filler", Priority(30), noop, 0) {
            Ok(_) => spawned += 1,
            Err(e) => break e,
        }
    };

    check(err == SpawnError::OutOfPages, "exhaustion produced the wrong error")?;
    check(spawned > 0, "pool was already exhausted")?;
    check(page::in_use() == page::POOL_PAGES, "failed spawn left partial state")?;

    // Sleep so the whole backlog runs, exits, and gets reaped
    timer::sleep(5);
    thread::yield_now();

    check(page::in_use() == before, "pool did not recover after the backlog exited")
}

/// With everyone asleep, the idle thread runs and its ticks land in the
/// idle counter.
pub fn idle_accounting() -> Result<(), &'static str> {
    let (idle_before, _, _) = thread::tick_counts();
    timer::sleep(12);
    let (idle_after, _, _) = thread::tick_counts();

    check(idle_after > idle_before, "idle thread never absorbed a tick")
}
