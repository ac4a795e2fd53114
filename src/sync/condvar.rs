/*
 * Condition Variable
 *
 * Lets a thread atomically release a lock and wait for a condition that
 * other threads signal under that same lock.
 *
 * Each waiter parks on a private one-shot semaphore that lives on its own
 * stack; the condition variable keeps only a pointer to it, pushed before
 * the lock is released and removed before the wakeup fires. Signal picks
 * the entry whose blocked thread has the highest priority.
 */

use core::cell::RefCell;
use core::ptr::NonNull;

use super::lock::Lock;
use super::semaphore::Semaphore;
use crate::arch::x86_64::interrupts;
use crate::thread::Priority;

/// Most threads that may wait on one condition at a time.
const WAITERS_CAP: usize = 16;

pub struct Condvar {
    waiters: RefCell<heapless::Vec<NonNull<Semaphore>, WAITERS_CAP>>,
}

// Mutated only with interrupts disabled on a single CPU; see sync module
// comment.
unsafe impl Sync for Condvar {}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            waiters: RefCell::new(heapless::Vec::new()),
        }
    }

    /// Release `lock`, wait to be signalled, reacquire `lock`.
    ///
    /// The caller must hold `lock`, and must re-check its condition on
    /// return: between the signal and the reacquisition other threads may
    /// have run.
    pub fn wait(&self, lock: &Lock) {
        assert!(!interrupts::in_handler());
        assert!(lock.held_by_current(), "condvar wait without the lock");

        let waiter = Semaphore::new(0);

        let old = interrupts::disable();
        assert!(
            self.waiters.borrow_mut().push(NonNull::from(&waiter)).is_ok(),
            "condvar waiter set overflow"
        );
        interrupts::set_level(old);

        lock.release();
        waiter.down();
        lock.acquire();
    }

    /// Wake the waiter whose thread has the highest priority, if any.
    ///
    /// The entry leaves the waiter set before its semaphore is upped, so
    /// the woken thread can return and pop its stack frame without this
    /// condvar holding a dangling pointer.
    pub fn signal(&self, lock: &Lock) {
        assert!(!interrupts::in_handler());
        assert!(lock.held_by_current(), "condvar signal without the lock");

        let old = interrupts::disable();
        let chosen = self.pick_waiter();
        interrupts::set_level(old);

        if let Some(sema) = chosen {
            unsafe { sema.as_ref() }.up();
        }
    }

    /// Wake every current waiter.
    pub fn broadcast(&self, lock: &Lock) {
        loop {
            let old = interrupts::disable();
            let empty = self.waiters.borrow().is_empty();
            interrupts::set_level(old);
            if empty {
                break;
            }
            self.signal(lock);
        }
    }

    fn pick_waiter(&self) -> Option<NonNull<Semaphore>> {
        let mut ws = self.waiters.borrow_mut();
        if ws.is_empty() {
            return None;
        }
        // A waiter that has registered but not yet parked reads as MIN;
        // it will be signalled eventually, just not preferentially
        let prio = |sema: &NonNull<Semaphore>| -> Priority {
            unsafe { sema.as_ref() }
                .with_waiters(|ts| ts.first().map(|t| t.get().priority))
                .unwrap_or(Priority::MIN)
        };
        let mut best = 0;
        for i in 1..ws.len() {
            if prio(&ws[i]) > prio(&ws[best]) {
                best = i;
            }
        }
        Some(ws.remove(best))
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
