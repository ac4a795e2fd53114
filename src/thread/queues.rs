/*
 * Scheduler Queues
 *
 * The two thread collections the scheduler core works over:
 *
 * - ReadyQueue: runnable threads ordered by effective priority, highest
 *   first, FIFO among equals. Insertion is an O(n) ordered insert, which
 *   is fine at kernel thread counts; pop-front is O(1) aside from the
 *   shift.
 * - SleepQueue: unordered set of blocked threads keyed by wakeup tick,
 *   scanned linearly on each timer tick.
 *
 * Both are plain Vecs whose capacity is reserved at boot; the tick
 * handler touches them in interrupt context and must never fall into the
 * heap allocator there.
 */

use alloc::vec::Vec;

use super::tcb::{Status, ThreadRef};

/// Runnable threads, sorted by descending effective priority with stable
/// FIFO ties.
pub struct ReadyQueue {
    slots: Vec<ThreadRef>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn reserve(&mut self, n: usize) {
        self.slots.reserve(n);
    }

    /// Ordered insert: after every thread with priority >= the newcomer's,
    /// so equal priorities run in arrival order.
    pub fn insert(&mut self, t: ThreadRef) {
        debug_assert!(!self.contains(t), "thread is already on the ready queue");
        let p = t.get().priority;
        let idx = self
            .slots
            .iter()
            .position(|other| other.get().priority < p)
            .unwrap_or(self.slots.len());
        self.slots.insert(idx, t);
    }

    pub fn pop_front(&mut self) -> Option<ThreadRef> {
        if self.slots.is_empty() {
            None
        } else {
            Some(self.slots.remove(0))
        }
    }

    pub fn front(&self) -> Option<ThreadRef> {
        self.slots.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, t: ThreadRef) -> bool {
        self.slots.contains(&t)
    }

    fn remove(&mut self, t: ThreadRef) -> bool {
        match self.slots.iter().position(|&x| x == t) {
            Some(idx) => {
                self.slots.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Re-place a queued thread whose effective priority changed (donation
    /// or an explicit set while it sat READY).
    pub fn reposition(&mut self, t: ThreadRef) {
        if self.remove(t) {
            self.insert(t);
        }
    }

    /// True when the queue order matches its sorting invariant; used by
    /// debug checks and the test suite.
    pub fn is_sorted(&self) -> bool {
        self.slots
            .windows(2)
            .all(|w| w[0].get().priority >= w[1].get().priority)
    }
}

/// Blocked threads waiting for a wakeup tick. Unordered; the per-tick scan
/// is proportional to the sleeper count, acceptable at kernel scale.
pub struct SleepQueue {
    slots: Vec<ThreadRef>,
}

impl SleepQueue {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn reserve(&mut self, n: usize) {
        self.slots.reserve(n);
    }

    pub fn push(&mut self, t: ThreadRef) {
        debug_assert!(t.get().status == Status::Running);
        debug_assert!(!self.slots.contains(&t));
        self.slots.push(t);
    }

    /// Remove and return one sleeper whose deadline has arrived, if any.
    ///
    /// Callers loop this until it returns None. The one-at-a-time shape
    /// keeps the tick path free of allocation.
    pub fn pop_expired(&mut self, now: i64) -> Option<ThreadRef> {
        let idx = self
            .slots
            .iter()
            .position(|&t| t.get().wakeup_tick <= now)?;
        Some(self.slots.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
