/*
 * Priority Scheduling Scenarios
 *
 * The strict-priority contract, observed from the outside: spawn
 * preempts when the newcomer outranks the spawner, ties run FIFO, yield
 * is a no-op while on top, and every wakeup goes to the best waiter.
 */

use super::{check, take_trace, trace};
use crate::sync::{Condvar, Lock, Semaphore};
use crate::thread::{self, Priority};

/// Spawning a higher-priority thread hands it the CPU before spawn
/// returns.
pub fn preempt_on_spawn() -> Result<(), &'static str> {
    fn child(_aux: usize) {
        trace("child");
    }

    thread::spawn("hi-child", Priority(32), child, 0).map_err(|_| "spawn failed")?;
    trace("after-spawn");

    check(
        take_trace() == ["child", "after-spawn"],
        "higher-priority child did not run inside spawn",
    )
}

/// Equal-priority threads run in arrival order after a yield.
pub fn fifo_among_equals() -> Result<(), &'static str> {
    const NAMES: [&str; 3] = ["A", "B", "C"];

    fn peer(aux: usize) {
        trace(NAMES[aux]);
    }

    for (i, name) in ["peer-a", "peer-b", "peer-c"].iter().enumerate() {
        thread::spawn(name, Priority::DEFAULT, peer, i).map_err(|_| "spawn failed")?;
    }
    trace("before-yield");
    thread::yield_now();
    trace("after");

    check(
        take_trace() == ["before-yield", "A", "B", "C", "after"],
        "equal-priority threads ran out of FIFO order",
    )
}

/// Yield does nothing while the runner outranks everyone; dropping the
/// runner's own priority is what lets the lower thread in.
pub fn yield_keeps_top() -> Result<(), &'static str> {
    fn lo(_aux: usize) {
        trace("lo");
    }

    thread::spawn("lo-child", Priority(30), lo, 0).map_err(|_| "spawn failed")?;
    thread::yield_now();
    check(take_trace().is_empty(), "yield ran a lower-priority thread")?;

    thread::set_priority(Priority(29));
    // The preemption check inside set_priority has already let `lo` run
    check(take_trace() == ["lo"], "demotion did not yield to the better thread")?;
    check(
        thread::get_priority() == Priority(29),
        "priority not at the demoted value",
    )?;

    thread::set_priority(Priority::DEFAULT);
    Ok(())
}

/// set/get round-trip: with no donors, the effective priority is exactly
/// the last value set.
pub fn set_get_priority() -> Result<(), &'static str> {
    thread::set_priority(Priority(45));
    let got = thread::get_priority();
    thread::set_priority(Priority::DEFAULT);

    check(got == Priority(45), "get_priority disagrees with set_priority")?;
    check(
        thread::get_priority() == Priority::DEFAULT,
        "priority not restored",
    )
}

/// Each semaphore up wakes the highest-priority waiter still parked.
pub fn sema_wakes_highest() -> Result<(), &'static str> {
    static GATE: Semaphore = Semaphore::new(0);
    static DONE: Semaphore = Semaphore::new(0);
    const NAMES: [&str; 3] = ["w-32", "w-34", "w-33"];

    fn waiter(aux: usize) {
        GATE.down();
        trace(NAMES[aux]);
        DONE.up();
    }

    // All three outrank the driver, so each parks on the gate before
    // spawn returns
    thread::spawn("w-32", Priority(32), waiter, 0).map_err(|_| "spawn failed")?;
    thread::spawn("w-34", Priority(34), waiter, 1).map_err(|_| "spawn failed")?;
    thread::spawn("w-33", Priority(33), waiter, 2).map_err(|_| "spawn failed")?;

    for _ in 0..3 {
        GATE.up();
    }
    for _ in 0..3 {
        DONE.down();
    }

    check(
        take_trace() == ["w-34", "w-33", "w-32"],
        "semaphore wakeups ignored waiter priority",
    )
}

/// Condvar signal picks the highest-priority waiting thread.
pub fn condvar_wakes_highest() -> Result<(), &'static str> {
    static LK: Lock = Lock::new();
    static CV: Condvar = Condvar::new();
    static DONE: Semaphore = Semaphore::new(0);
    const NAMES: [&str; 3] = ["cv-34", "cv-32", "cv-33"];

    fn waiter(aux: usize) {
        LK.acquire();
        CV.wait(&LK);
        trace(NAMES[aux]);
        LK.release();
        DONE.up();
    }

    thread::spawn("cv-34", Priority(34), waiter, 0).map_err(|_| "spawn failed")?;
    thread::spawn("cv-32", Priority(32), waiter, 1).map_err(|_| "spawn failed")?;
    thread::spawn("cv-33", Priority(33), waiter, 2).map_err(|_| "spawn failed")?;

    for _ in 0..3 {
        LK.acquire();
        CV.signal(&LK);
        LK.release();
    }
    for _ in 0..3 {
        DONE.down();
    }

    check(
        take_trace() == ["cv-34", "cv-33", "cv-32"],
        "condvar signals ignored waiter priority",
    )?;

    // Broadcast drains the rest, still best-first
    thread::spawn("cv-33b", Priority(33), waiter, 2).map_err(|_| "spawn failed")?;
    thread::spawn("cv-32b", Priority(32), waiter, 1).map_err(|_| "spawn failed")?;

    LK.acquire();
    CV.broadcast(&LK);
    LK.release();
    for _ in 0..2 {
        DONE.down();
    }

    check(
        take_trace() == ["cv-33", "cv-32"],
        "broadcast did not drain waiters by priority",
    )
}
