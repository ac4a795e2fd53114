/*
 * Lock
 *
 * Mutual exclusion for kernel threads: a semaphore of one plus a holder
 * reference. The holder is what makes priority donation possible: a
 * blocking acquirer can see who stands in its way and lend its priority
 * down the chain.
 *
 * Not recursive: a holder re-acquiring is a bug and asserts.
 */

use core::cell::Cell;
use core::ptr::NonNull;

use super::semaphore::Semaphore;
use crate::arch::x86_64::interrupts;
use crate::thread::{self, ThreadRef, donation};

pub struct Lock {
    holder: Cell<Option<ThreadRef>>,
    sema: Semaphore,
}

// Mutated only with interrupts disabled on a single CPU; see sync module
// comment.
unsafe impl Sync for Lock {}

impl Lock {
    pub const fn new() -> Self {
        Self {
            holder: Cell::new(None),
            sema: Semaphore::new(1),
        }
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// If the lock is held, the caller first records the wait edge
    /// (`wait_on_lock`, membership in the holder's donations set) and
    /// donates its priority along the wait chain; only then does it park
    /// on the semaphore. On handoff the new holder adopts the donations
    /// of everyone still queued behind it.
    pub fn acquire(&self) {
        assert!(!interrupts::in_handler());
        assert!(!self.held_by_current(), "lock is not recursive");

        let old = interrupts::disable();

        if let Some(holder) = self.holder.get() {
            let cur = thread::current();
            cur.get().wait_on_lock = Some(NonNull::from(self));
            if holder.get().donations.push(cur).is_err() {
                // Degrade like the donation depth cap: the lock still
                // works, the boost is lost
                log::warn!(
                    "donation set of {} overflowed; donation from {} dropped",
                    holder.get().tid,
                    cur.get().tid
                );
            }
            donation::donate(cur);
        }

        self.sema.down();

        // The lock is ours; move the bookkeeping over
        let cur = thread::current();
        cur.get().wait_on_lock = None;
        self.holder.set(Some(cur));

        // Threads still parked on the semaphore were donating to the
        // previous holder; they now wait on us
        self.sema.with_waiters(|waiters| {
            for &w in waiters {
                if cur.get().donations.push(w).is_err() {
                    log::warn!(
                        "donation set of {} overflowed; donation from {} dropped",
                        cur.get().tid,
                        w.get().tid
                    );
                }
            }
        });
        donation::refresh(cur);

        interrupts::set_level(old);
    }

    /// Acquire the lock only if that needs no waiting.
    pub fn try_acquire(&self) -> bool {
        assert!(!interrupts::in_handler());

        let old = interrupts::disable();
        let taken = self.sema.try_down();
        if taken {
            self.holder.set(Some(thread::current()));
        }
        interrupts::set_level(old);
        taken
    }

    /// Release the lock and wake the best waiter.
    ///
    /// Donations received through this lock are shed first and the
    /// effective priority recomputed, so by the time the semaphore wakes
    /// a waiter the releaser has already fallen back to its remaining
    /// claim, which is exactly when the woken thread should preempt it.
    pub fn release(&self) {
        assert!(self.held_by_current(), "lock released by a non-holder");

        let old = interrupts::disable();
        let cur = thread::current();
        donation::remove_lock_donations(cur, self as *const Lock);
        donation::refresh(cur);
        self.holder.set(None);
        self.sema.up();
        interrupts::set_level(old);
    }

    /// Whether the running thread holds this lock.
    pub fn held_by_current(&self) -> bool {
        self.holder.get() == Some(thread::current())
    }

    /// Current holder, if any. The donation walk follows this edge.
    pub(crate) fn holder(&self) -> Option<ThreadRef> {
        self.holder.get()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
