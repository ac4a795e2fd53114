/*
 * Priority Donation Scenarios
 *
 * The donation engine, exercised through real locks: a blocked
 * high-priority waiter boosts the holder, boosts travel down nested
 * wait chains, multiple locks stack independent donations, and an
 * explicit set_priority cannot undercut a live donation.
 */

use super::{check, take_trace, trace};
use crate::sync::{Lock, Semaphore};
use crate::thread::{self, Priority};

/// One waiter, one lock: the holder runs at the waiter's priority until
/// it releases, and the waiter runs immediately after the release.
pub fn single() -> Result<(), &'static str> {
    static L: Lock = Lock::new();
    static DONE: Semaphore = Semaphore::new(0);

    fn hi(_aux: usize) {
        L.acquire();
        trace("hi-got-lock");
        L.release();
        DONE.up();
    }

    L.acquire();
    check(!L.try_acquire(), "try_acquire took a lock that is already held")?;
    thread::spawn("donor-hi", Priority(33), hi, 0).map_err(|_| "spawn failed")?;

    // hi preempted us, hit the held lock, and donated
    check(
        thread::get_priority() == Priority(33),
        "holder did not inherit the waiter's priority",
    )?;

    trace("releasing");
    L.release();

    check(
        thread::get_priority() == Priority::DEFAULT,
        "priority did not revert on release",
    )?;
    DONE.down();

    check(
        take_trace() == ["releasing", "hi-got-lock"],
        "waiter ran before the lock was released",
    )?;

    check(L.try_acquire(), "try_acquire failed on a free lock")?;
    L.release();
    Ok(())
}

/// Two-level chain: H waits on M's lock while M waits on ours, so H's
/// priority must reach both M and us.
pub fn nested() -> Result<(), &'static str> {
    static L1: Lock = Lock::new();
    static L2: Lock = Lock::new();
    static DONE: Semaphore = Semaphore::new(0);

    fn mid(_aux: usize) {
        L1.acquire();
        trace("m-has-l1");
        L2.acquire();
        trace("m-has-l2");
        L2.release();
        L1.release();
        DONE.up();
    }

    fn high(_aux: usize) {
        L1.acquire();
        trace("h-has-l1");
        L1.release();
        DONE.up();
    }

    thread::set_priority(Priority(32));
    L2.acquire();

    thread::spawn("donor-m", Priority(34), mid, 0).map_err(|_| "spawn failed")?;
    check(
        thread::get_priority() == Priority(34),
        "first-level donation missing",
    )?;

    thread::spawn("donor-h", Priority(36), high, 0).map_err(|_| "spawn failed")?;
    check(
        thread::get_priority() == Priority(36),
        "donation did not travel down the chain",
    )?;
    check(
        thread::priority_of("donor-m") == Some(Priority(36)),
        "middle thread missed the chained donation",
    )?;

    L2.release();
    for _ in 0..2 {
        DONE.down();
    }

    let reverted = thread::get_priority() == Priority(32);
    thread::set_priority(Priority::DEFAULT);

    check(reverted, "priority did not revert after the chain unwound")?;
    check(
        take_trace() == ["m-has-l1", "m-has-l2", "h-has-l1"],
        "chain unwound in the wrong order",
    )
}

/// Two locks, one donor each: releasing a lock sheds exactly that lock's
/// donation, and the floor returns only after both are gone.
pub fn two_locks() -> Result<(), &'static str> {
    static LA: Lock = Lock::new();
    static LB: Lock = Lock::new();
    static DONE: Semaphore = Semaphore::new(0);

    fn h1(_aux: usize) {
        LA.acquire();
        trace("h1");
        LA.release();
        DONE.up();
    }

    fn h2(_aux: usize) {
        LB.acquire();
        trace("h2");
        LB.release();
        DONE.up();
    }

    LA.acquire();
    LB.acquire();

    thread::spawn("donor-33", Priority(33), h1, 0).map_err(|_| "spawn failed")?;
    check(thread::get_priority() == Priority(33), "first donation missing")?;

    thread::spawn("donor-34", Priority(34), h2, 0).map_err(|_| "spawn failed")?;
    check(thread::get_priority() == Priority(34), "second donation missing")?;

    LB.release();
    check(
        thread::get_priority() == Priority(33),
        "releasing one lock dropped the other donation too",
    )?;

    LA.release();
    check(
        thread::get_priority() == Priority::DEFAULT,
        "priority did not return to the floor",
    )?;

    for _ in 0..2 {
        DONE.down();
    }
    check(take_trace() == ["h2", "h1"], "waiters ran out of donation order")
}

/// While a donation is live, lowering the base priority must not lower
/// the effective one; the new base applies once the donation drains.
pub fn donate_then_lower_base() -> Result<(), &'static str> {
    static L: Lock = Lock::new();
    static DONE: Semaphore = Semaphore::new(0);

    fn hi(_aux: usize) {
        L.acquire();
        trace("hi");
        L.release();
        DONE.up();
    }

    L.acquire();
    thread::spawn("donor-33b", Priority(33), hi, 0).map_err(|_| "spawn failed")?;

    thread::set_priority(Priority(25));
    check(
        thread::get_priority() == Priority(33),
        "set_priority undercut a live donation",
    )?;

    L.release();
    let after = thread::get_priority();
    thread::set_priority(Priority::DEFAULT);
    DONE.down();
    take_trace();

    check(after == Priority(25), "base priority lost across the donation")
}
