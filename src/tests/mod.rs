/*
 * Scenario Suite for the Thread Subsystem
 *
 * In-kernel tests, driven by the bootstrap thread after the scheduler is
 * up. Each case spawns real threads, coordinates them with semaphores,
 * and checks the observable execution order against what the scheduler
 * guarantees.
 *
 * ## Categories
 *
 * - alarm: timed sleep wakes at the right tick, in deadline order
 * - priority: preemption on spawn, FIFO ties, priority get/set laws,
 *   highest-waiter wakeups
 * - donation: single, nested, and multi-lock priority donation
 * - lifecycle: page reclamation after exit, pool exhaustion reporting,
 *   idle accounting
 *
 * Threads record what they saw through the shared trace; the parent
 * compares the trace against the expected order. Cases leave the kernel
 * the way they found it (priority restored, all children joined), so the
 * suite order is not load-bearing.
 */

pub mod alarm;
pub mod donation;
pub mod lifecycle;
pub mod priority;

use alloc::vec::Vec;

use spin::Mutex;

/// Execution trace shared between a scenario's threads.
static TRACE: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Append an event to the scenario trace.
///
/// Interrupts off around the push so a mid-push preemption cannot
/// livelock a higher-priority tracer against the held lock. The capacity
/// reserved in `run_all` keeps the push out of the heap allocator.
pub(crate) fn trace(event: &'static str) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        TRACE.lock().push(event);
    });
}

/// Drain the trace, returning everything recorded since the last drain.
///
/// Only the suite driver calls this, between joins, when no tracer can
/// be running.
pub(crate) fn take_trace() -> Vec<&'static str> {
    let mut guard = TRACE.lock();
    let drained = guard.clone();
    guard.clear();
    drained
}

/// Fail a case with `why` unless `cond` holds.
pub(crate) fn check(cond: bool, why: &'static str) -> Result<(), &'static str> {
    if cond { Ok(()) } else { Err(why) }
}

type TestFn = fn() -> Result<(), &'static str>;

const CASES: &[(&str, TestFn)] = &[
    ("alarm-wake-order", alarm::wake_order),
    ("alarm-not-early", alarm::wake_not_early),
    ("preempt-on-spawn", priority::preempt_on_spawn),
    ("fifo-among-equals", priority::fifo_among_equals),
    ("yield-keeps-top", priority::yield_keeps_top),
    ("set-get-priority", priority::set_get_priority),
    ("sema-wakes-highest", priority::sema_wakes_highest),
    ("condvar-wakes-highest", priority::condvar_wakes_highest),
    ("donate-single", donation::single),
    ("donate-nested", donation::nested),
    ("donate-two-locks", donation::two_locks),
    ("donate-then-lower-base", donation::donate_then_lower_base),
    ("pages-reclaimed", lifecycle::pages_reclaimed),
    ("spawn-exhaustion", lifecycle::spawn_exhaustion),
    ("idle-accounting", lifecycle::idle_accounting),
];

/// Run every case in sequence and log a summary.
pub fn run_all() {
    log::info!("=== SCENARIO SUITE: {} cases ===", CASES.len());

    // Tracers run with interrupts off; keep their pushes allocation-free
    TRACE.lock().reserve(128);

    let mut passed = 0;
    let mut failed = 0;

    for (name, case) in CASES {
        take_trace(); // scrub anything a previous case left behind
        log::info!("--- {} ---", name);
        match case() {
            Ok(()) => {
                passed += 1;
                log::info!("{}: PASSED", name);
            }
            Err(why) => {
                failed += 1;
                log::error!("{}: FAILED - {}", name, why);
            }
        }

        // Cross-case invariant: whatever the case did, the ready queue
        // must still be priority-sorted
        if !crate::thread::ready_is_sorted() {
            failed += 1;
            log::error!("{}: left the ready queue unsorted", name);
        }
    }

    log::info!("=== SCENARIO SUITE: {} passed, {} failed ===", passed, failed);

    // Final state dump for anyone reading the serial log
    for info in crate::thread::snapshot() {
        log::info!(
            "  {} '{}' {:?} priority {}",
            info.tid,
            info.name,
            info.status,
            info.priority
        );
    }
    let (idle, kernel, user) = crate::thread::tick_counts();
    log::info!("  ticks: {} idle, {} kernel, {} user", idle, kernel, user);
}
