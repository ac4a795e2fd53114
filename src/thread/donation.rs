/*
 * Priority Donation Engine
 *
 * When a thread blocks on a lock whose holder has lower effective
 * priority, the scheduler would otherwise run a middle-priority thread
 * ahead of the holder and invert the waiter's priority. Donation closes
 * the hole: the waiter lends its effective priority to the holder, and
 * transitively to whatever the holder itself is waiting on.
 *
 * All entry points require interrupts disabled; they mutate TCBs that the
 * tick handler and other threads also look at.
 */

use super::queues::ReadyQueue;
use super::tcb::{Status, ThreadRef};
use crate::arch::x86_64::interrupts::{self, Level};
use crate::sync::Lock;

/// Longest wait-for chain a donation will follow.
///
/// The cap bounds the walk when a locking bug creates a cycle (which must
/// not hang the kernel), and inheritance deeper than this has no practical
/// value anyway.
pub const MAX_DONATION_DEPTH: usize = 8;

/// Push `donor`'s effective priority along its wait-for chain.
///
/// Visits `donor -> holder -> holder's holder -> ...` for at most
/// MAX_DONATION_DEPTH hops, raising each holder that ranks below the
/// donor. A boosted holder sitting on the ready queue is re-placed so the
/// queue stays sorted.
pub(crate) fn donate(donor: ThreadRef) {
    debug_assert_eq!(interrupts::get_level(), Level::Off);

    let donated = donor.get().priority;
    let mut t = donor;
    for _ in 0..MAX_DONATION_DEPTH {
        let Some(lock) = t.get().wait_on_lock else {
            break;
        };
        let Some(holder) = (unsafe { lock.as_ref() }).holder() else {
            break;
        };
        let tcb = holder.get();
        if tcb.priority < donated {
            tcb.priority = donated;
            if tcb.status == Status::Ready {
                super::with_ready(|ready: &mut ReadyQueue| ready.reposition(holder));
            }
        }
        t = holder;
    }
}

/// Recompute `t`'s effective priority from its floor and its donors.
///
/// Called after anything that may lower the thread's claim: its own
/// priority was set, or it released a lock and shed donors. The donations
/// set is unordered; the best donor is found at read time.
pub(crate) fn refresh(t: ThreadRef) {
    debug_assert_eq!(interrupts::get_level(), Level::Off);

    let tcb = t.get();
    let mut best = tcb.init_priority;
    for &donor in tcb.donations.iter() {
        let p = donor.get().priority;
        if p > best {
            best = p;
        }
    }
    if best != tcb.priority {
        tcb.priority = best;
        if tcb.status == Status::Ready {
            super::with_ready(|ready: &mut ReadyQueue| ready.reposition(t));
        }
    }
}

/// Drop every donation `holder` received through `lock`.
///
/// Run by lock release, before the refresh that lets the holder's
/// priority fall back.
pub(crate) fn remove_lock_donations(holder: ThreadRef, lock: *const Lock) {
    debug_assert_eq!(interrupts::get_level(), Level::Off);

    holder.get().donations.retain(|d| {
        d.get()
            .wait_on_lock
            .map(|l| l.as_ptr() as *const Lock)
            != Some(lock)
    });
}
