/*
 * Timed Sleep Scenarios
 *
 * A sleeper must come back on the first tick at or after its deadline,
 * and sleepers with distinct deadlines must wake in deadline order no
 * matter what order they went to sleep in.
 */

use core::sync::atomic::{AtomicI64, Ordering};

use super::{check, take_trace, trace};
use crate::drivers::timer;
use crate::sync::Semaphore;
use crate::thread::{self, Priority};

/// Deadline base shared with the sleeper threads.
static BASE: AtomicI64 = AtomicI64::new(0);

static DONE: Semaphore = Semaphore::new(0);

fn sleeper(aux: usize) {
    let delay = aux as i64;
    thread::sleep_until(BASE.load(Ordering::SeqCst) + delay);
    trace(match delay {
        10 => "B",
        20 => "A",
        _ => "C",
    });
    DONE.up();
}

/// Sleepers with deadlines +10/+20/+30 wake in that order, regardless of
/// their creation order.
pub fn wake_order() -> Result<(), &'static str> {
    // A couple of ticks of slack so all three park before the first
    // deadline can possibly fire
    BASE.store(timer::ticks() + 5, Ordering::SeqCst);

    // Creation order B, A, C; deadline order is the same here, the names
    // just make the log match the scenario
    thread::spawn("alarm-b", Priority::DEFAULT, sleeper, 10).map_err(|_| "spawn failed")?;
    thread::spawn("alarm-a", Priority::DEFAULT, sleeper, 20).map_err(|_| "spawn failed")?;
    thread::spawn("alarm-c", Priority::DEFAULT, sleeper, 30).map_err(|_| "spawn failed")?;

    for _ in 0..3 {
        DONE.down();
    }

    check(take_trace() == ["B", "A", "C"], "sleepers woke out of deadline order")
}

/// A sleeper never runs before its wake tick, and not noticeably after
/// it either on an otherwise idle system.
pub fn wake_not_early() -> Result<(), &'static str> {
    let deadline = timer::ticks() + 8;
    thread::sleep_until(deadline);
    let woke_at = timer::ticks();

    check(woke_at >= deadline, "woke before the wake tick")?;
    check(woke_at - deadline <= 1, "woke more than a tick late on an idle system")
}
