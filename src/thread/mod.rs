/*
 * Kernel Thread Subsystem
 *
 * Preemptive, strict-priority multitasking over a single CPU: creation,
 * blocking, unblocking, voluntary yield, termination, timed sleep, and a
 * priority scheduler with donation for the lock primitives.
 *
 * SCHEDULING MODEL:
 * ================
 *
 * The highest-priority READY thread always runs; equal priorities run
 * round-robin in FIFO order. Preemption comes from exactly two places:
 * the timer tick (slice expiry, or waking a sleeper that outranks the
 * running thread) and the explicit preemption checks sprinkled after
 * every priority-raising operation. Unblocking never preempts by itself,
 * so a caller can wake a batch of threads and pay for one yield.
 *
 * SYNCHRONIZATION:
 * ===============
 *
 * Disabling interrupts is the only primitive this module relies on. The
 * global queue state sits behind a spin mutex as well, but every
 * acquisition happens with interrupts off, so on this single CPU the lock
 * never spins; it exists to give the borrow checker a single door into
 * the queues. The lock is always released before the register switch.
 *
 * THREAD LIFECYCLE:
 * ================
 *
 *  Blocked --unblock--> Ready --schedule--> Running
 *  Running --block--> Blocked
 *  Running --yield--> Ready
 *  Running --exit--> Dying --(next schedule reaps)--> page freed
 *
 * A dying thread cannot free its own page (it is still executing on it),
 * so destruction is split across two scheduler invocations: exit marks
 * the thread DYING and switches away; the next schedule() drains the
 * graveyard before picking a successor.
 */

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU32, Ordering};

use spin::Mutex;

pub mod donation;
mod queues;
mod tcb;

pub use tcb::{DONOR_CAP, NAME_CAP, Priority, Status, THREAD_MAGIC, Tcb, ThreadRef, Tid};

use crate::arch::x86_64::interrupts::{self, Level};
use crate::arch::x86_64::switch::{self, RFLAGS_IF, RFLAGS_RESERVED, TrapFrame};
use crate::arch::x86_64::gdt;
use crate::memory::page;
use crate::sync::Semaphore;
use queues::{ReadyQueue, SleepQueue};

/// Ticks each thread gets before the tick handler requests a yield.
pub const TIME_SLICE: u32 = 4;

/// Entry point of a kernel thread; receives the `aux` it was spawned with.
pub type ThreadFunc = fn(usize);

/// Global queue state. Always locked with interrupts disabled.
struct Sched {
    /// Runnable threads, sorted by effective priority.
    ready: ReadyQueue,
    /// Threads waiting out a timed sleep.
    sleepers: SleepQueue,
    /// Dead threads whose pages the next schedule() returns to the pool.
    graveyard: VecDeque<ThreadRef>,
    /// Every live thread, for diagnostics and the test suite.
    all: Vec<ThreadRef>,
}

static SCHED: Mutex<Sched> = Mutex::new(Sched {
    ready: ReadyQueue::new(),
    sleepers: SleepQueue::new(),
    graveyard: VecDeque::new(),
    all: Vec::new(),
});

/// The idle thread, once it has introduced itself.
static IDLE: AtomicPtr<Tcb> = AtomicPtr::new(core::ptr::null_mut());

/// The bootstrap thread. Its page is a static, so it is never reaped.
static INITIAL: AtomicPtr<Tcb> = AtomicPtr::new(core::ptr::null_mut());

/// Monotonic tid source, serialized by its mutex.
static NEXT_TID: Mutex<i64> = Mutex::new(1);

/// Set once `start()` has run and the scheduler is live.
static STARTED: AtomicBool = AtomicBool::new(false);

/// `-o mlfqs` was on the boot command line. The alternate policy is not
/// built into this kernel; the flag is recorded and reported.
static MLFQS: AtomicBool = AtomicBool::new(false);

/// Ticks consumed by the current thread's slice.
static THREAD_TICKS: AtomicU32 = AtomicU32::new(0);

// Per-category tick counters
static IDLE_TICKS: AtomicI64 = AtomicI64::new(0);
static KERNEL_TICKS: AtomicI64 = AtomicI64::new(0);
static USER_TICKS: AtomicI64 = AtomicI64::new(0);

/// Why a spawn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The page pool has no page left for the thread's TCB and stack.
    OutOfPages,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::OutOfPages => write!(f, "out of thread pages"),
        }
    }
}

/// Point-in-time view of one thread, for diagnostics.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub tid: Tid,
    pub name: heapless::String<NAME_CAP>,
    pub status: Status,
    pub priority: Priority,
}

// ================================================================================================
// INITIALIZATION
// ================================================================================================

/// Turn the code running at boot into the first thread.
///
/// Forges a TCB at the base of the bootstrap stack page that `_start`
/// installed, so the stack-pointer masking trick works from here on.
/// Interrupts must still be off; runs exactly once.
pub fn init() {
    assert_eq!(interrupts::get_level(), Level::Off);
    assert!(INITIAL.load(Ordering::SeqCst).is_null(), "thread::init ran twice");

    let main = unsafe { tcb::forge_running("main", Priority::DEFAULT) };
    main.get().tid = allocate_tid();
    INITIAL.store(main.get() as *mut Tcb, Ordering::SeqCst);

    let mut s = SCHED.lock();
    // The tick handler works these queues in interrupt context and must
    // never reach the heap allocator; reserve for every page-pool thread
    // plus the two static ones up front.
    let cap = page::POOL_PAGES + 2;
    s.ready.reserve(cap);
    s.sleepers.reserve(cap);
    s.graveyard.reserve(cap);
    s.all.reserve(cap);
    s.all.push(main);
    drop(s);

    log::info!("Thread subsystem initialized; bootstrap thread is {}", main.get().tid);
}

/// Start preemptive scheduling: spawn the idle thread and enable
/// interrupts. Returns once the idle thread has come up.
pub fn start() {
    static IDLE_STARTED: Semaphore = Semaphore::new(0);

    spawn(
        "idle",
        Priority::MIN,
        idle_main,
        &IDLE_STARTED as *const Semaphore as usize,
    )
    .expect("no page for the idle thread");

    STARTED.store(true, Ordering::SeqCst);
    interrupts::enable();

    // Idle runs once to record itself, then parks forever
    IDLE_STARTED.down();
    log::info!("Scheduler started - preemptive multitasking active");
}

/// True once `start()` has run.
pub fn started() -> bool {
    STARTED.load(Ordering::SeqCst)
}

pub fn set_mlfqs(enabled: bool) {
    MLFQS.store(enabled, Ordering::SeqCst);
}

pub fn mlfqs_enabled() -> bool {
    MLFQS.load(Ordering::SeqCst)
}

// ================================================================================================
// CURRENT THREAD
// ================================================================================================

/// Handle to the running thread, recovered from the stack pointer.
pub fn current() -> ThreadRef {
    let t = ThreadRef::from_raw(tcb::running_tcb());
    debug_assert_eq!(t.get().status, Status::Running);
    t
}

/// Tid of the running thread.
pub fn current_tid() -> Tid {
    current().get().tid
}

/// Name of the running thread.
pub fn name() -> heapless::String<NAME_CAP> {
    current().get().name.clone()
}

fn idle_ref() -> Option<ThreadRef> {
    NonNull::new(IDLE.load(Ordering::SeqCst)).map(ThreadRef::from_raw)
}

fn initial_ref() -> ThreadRef {
    let ptr = NonNull::new(INITIAL.load(Ordering::SeqCst))
        .expect("thread::init has not run");
    ThreadRef::from_raw(ptr)
}

fn allocate_tid() -> Tid {
    // Interrupts off while the lock is held: a preempted holder would
    // livelock any higher-priority spinner on this single CPU
    let old = interrupts::disable();
    let tid = {
        let mut next = NEXT_TID.lock();
        let tid = Tid(*next);
        *next += 1;
        tid
    };
    interrupts::set_level(old);
    tid
}

// ================================================================================================
// CREATION AND TERMINATION
// ================================================================================================

/// Create a kernel thread running `func(aux)` and make it runnable.
///
/// The thread gets one zeroed page from the pool: TCB at the base, stack
/// above it. Its first dispatch enters the trampoline below with `func`
/// and `aux` already in the argument registers and interrupts enabled in
/// the forged flags. If the newcomer outranks the caller it runs before
/// this function returns.
///
/// Page exhaustion is reported, not fatal; no partial state is left
/// behind.
pub fn spawn(name: &str, priority: Priority, func: ThreadFunc, aux: usize) -> Result<Tid, SpawnError> {
    assert!(priority.valid(), "priority {} out of range", priority);

    let page = page::alloc().ok_or(SpawnError::OutOfPages)?;
    let t = unsafe { Tcb::init_at(page, name, priority) };

    {
        let sel = gdt::kernel_selectors();
        let tcb = t.get();
        tcb.frame = TrapFrame::zeroed();
        tcb.frame.rip = kernel_thread as usize as u64;
        tcb.frame.rdi = func as usize as u64;
        tcb.frame.rsi = aux as u64;
        tcb.frame.cs = sel.code.0 as u64;
        tcb.frame.ss = sel.data.0 as u64;
        tcb.frame.rflags = RFLAGS_IF | RFLAGS_RESERVED;
        tcb.frame.rsp = t.stack_top();
        tcb.tid = allocate_tid();
    }

    let old = interrupts::disable();
    SCHED.lock().all.push(t);
    interrupts::set_level(old);

    let tid = t.get().tid;
    log::debug!("spawned {} '{}' at priority {}", tid, t.get().name, priority);

    unblock(t);
    preempt_check();

    Ok(tid)
}

/// Runtime entry of every spawned thread.
///
/// The forged frame lands here on first dispatch. The scheduler handed
/// control over with interrupts off in principle; the forged flags have
/// IF set, but enable explicitly so the contract does not depend on them.
extern "C" fn kernel_thread(func: ThreadFunc, aux: usize) -> ! {
    interrupts::enable();
    func(aux);
    exit()
}

/// Terminate the running thread. Does not return.
///
/// The thread is still executing on its own page, so the page cannot be
/// freed here; the next scheduler invocation reaps it.
pub fn exit() -> ! {
    assert!(!interrupts::in_handler());

    log::debug!("{} '{}' exiting", current_tid(), name());

    // A user-process layer would tear down the address space here.
    interrupts::disable();
    schedule(Status::Dying);
    unreachable!("a dying thread was scheduled again");
}

// ================================================================================================
// STATE TRANSITIONS
// ================================================================================================

/// Block the running thread until someone passes it to `unblock`.
///
/// The caller must have interrupts disabled already; pairing the disable
/// with whatever condition it is waiting on is the caller's business.
pub fn block() {
    assert!(!interrupts::in_handler());
    assert_eq!(interrupts::get_level(), Level::Off);
    schedule(Status::Blocked);
}

/// Make a blocked thread runnable.
///
/// Does **not** preempt: the caller may atomically unblock several
/// threads and then either yield once or let the next tick sort it out.
/// Callers that want the usual behavior follow up with `preempt_check`.
pub fn unblock(t: ThreadRef) {
    let old = interrupts::disable();
    {
        let mut s = SCHED.lock();
        unblock_locked(&mut s, t);
    }
    interrupts::set_level(old);
}

fn unblock_locked(s: &mut Sched, t: ThreadRef) {
    let tcb = t.get();
    assert_eq!(tcb.status, Status::Blocked, "unblock of a non-blocked thread");
    s.ready.insert(t);
    tcb.status = Status::Ready;
}

/// Give up the CPU; the thread stays runnable and re-queues behind its
/// priority peers.
pub fn yield_now() {
    assert!(!interrupts::in_handler());

    let old = interrupts::disable();
    let cur = current();
    if Some(cur) != idle_ref() {
        SCHED.lock().ready.insert(cur);
    }
    schedule(Status::Ready);
    interrupts::set_level(old);
}

/// Block the running thread until the timer reaches `wake_tick`.
pub fn sleep_until(wake_tick: i64) {
    assert!(!interrupts::in_handler());

    let old = interrupts::disable();
    let cur = current();
    assert!(Some(cur) != idle_ref(), "the idle thread cannot sleep");
    cur.get().wakeup_tick = wake_tick;
    SCHED.lock().sleepers.push(cur);
    schedule(Status::Blocked);
    interrupts::set_level(old);
}

/// Wake every sleeper whose deadline is at or before `now`.
pub fn awake(now: i64) {
    let old = interrupts::disable();
    {
        let mut s = SCHED.lock();
        while let Some(t) = s.sleepers.pop_expired(now) {
            unblock_locked(&mut s, t);
        }
    }
    interrupts::set_level(old);
}

/// Yield if the front of the ready queue outranks the running thread.
///
/// The preemption half of every priority-raising operation: spawn,
/// priority changes, and lock/semaphore release all end here.
pub fn preempt_check() {
    assert!(!interrupts::in_handler());

    let old = interrupts::disable();
    let outranked = {
        let s = SCHED.lock();
        match s.ready.front() {
            Some(front) => front.get().priority > current().get().priority,
            None => false,
        }
    };
    interrupts::set_level(old);

    if outranked {
        yield_now();
    }
}

// ================================================================================================
// PRIORITY API
// ================================================================================================

/// Set the running thread's base priority.
///
/// Donations can hold the effective priority above the new base; the
/// refresh sorts that out, and the preemption check runs in case the
/// thread just demoted itself below a waiter.
pub fn set_priority(priority: Priority) {
    assert!(priority.valid(), "priority {} out of range", priority);
    if mlfqs_enabled() {
        // Priorities are policy-managed under mlfqs; explicit sets are
        // ignored. The policy itself is not part of this kernel.
        return;
    }

    let old = interrupts::disable();
    let cur = current();
    cur.get().init_priority = priority;
    donation::refresh(cur);
    interrupts::set_level(old);

    preempt_check();
}

/// The running thread's effective priority.
pub fn get_priority() -> Priority {
    let old = interrupts::disable();
    let p = current().get().priority;
    interrupts::set_level(old);
    p
}

/// Run `f` over the ready queue with interrupts off. Donation uses this
/// to re-place boosted threads without owning the queue statics.
pub(crate) fn with_ready<R>(f: impl FnOnce(&mut ReadyQueue) -> R) -> R {
    debug_assert_eq!(interrupts::get_level(), Level::Off);
    f(&mut SCHED.lock().ready)
}

// ================================================================================================
// TICK HANDLER
// ================================================================================================

/// Per-tick scheduler work; called by the timer interrupt with the new
/// tick count.
///
/// Never switches threads itself: when the slice is up, or a freshly
/// woken sleeper outranks the running thread, it arms the deferred yield
/// that fires on the way out of the handler.
pub fn tick(now: i64) {
    debug_assert!(interrupts::in_handler());

    let cur = current();

    // Classify the tick
    if Some(cur) == idle_ref() {
        IDLE_TICKS.fetch_add(1, Ordering::SeqCst);
    } else if !cur.get().pml4.is_null() {
        USER_TICKS.fetch_add(1, Ordering::SeqCst);
    } else {
        KERNEL_TICKS.fetch_add(1, Ordering::SeqCst);
    }

    // Wake expired sleepers, then check whether one of them (or anything
    // else that arrived) outranks the interrupted thread
    awake(now);
    {
        let s = SCHED.lock();
        if let Some(front) = s.ready.front() {
            if front.get().priority > cur.get().priority {
                interrupts::yield_on_return();
            }
        }
    }

    // Slice accounting
    if THREAD_TICKS.fetch_add(1, Ordering::SeqCst) + 1 >= TIME_SLICE {
        interrupts::yield_on_return();
    }
}

/// Tick counters: (idle, kernel, user).
pub fn tick_counts() -> (i64, i64, i64) {
    (
        IDLE_TICKS.load(Ordering::SeqCst),
        KERNEL_TICKS.load(Ordering::SeqCst),
        USER_TICKS.load(Ordering::SeqCst),
    )
}

// ================================================================================================
// SCHEDULER CORE
// ================================================================================================

/// Record the running thread's next state and switch to the best
/// successor.
///
/// Entry contract: interrupts off, not in an interrupt handler, and no
/// spin lock held that the successor might want. The queue lock is
/// released before the register switch for exactly that reason.
fn schedule(next_status: Status) {
    assert_eq!(interrupts::get_level(), Level::Off);
    assert!(!interrupts::in_handler());

    let cur = current();
    cur.get().status = next_status;

    let (cur_frame, next_frame, switching) = {
        let mut s = SCHED.lock();

        // Reap threads that died before this invocation. Never the
        // current thread: a victim lands here only on the schedule that
        // switches away from it.
        while let Some(victim) = s.graveyard.pop_front() {
            debug_assert!(victim != cur);
            let tcb = victim.get();
            debug_assert_eq!(tcb.status, Status::Dying);
            s.all.retain(|&t| t != victim);
            tcb.retire();
            page::free(victim.page());
        }

        // Highest-priority runnable thread, or idle when there is none
        let next = s.ready.pop_front().unwrap_or_else(|| {
            idle_ref().expect("no runnable thread and no idle thread")
        });

        next.get().status = Status::Running;
        THREAD_TICKS.store(0, Ordering::SeqCst);

        let switching = next != cur;
        if switching && cur.get().status == Status::Dying && cur != initial_ref() {
            // Its page is freed by the *next* schedule; the thread is
            // still standing on it right now
            s.graveyard.push_back(cur);
        }

        (
            &mut cur.get().frame as *mut TrapFrame,
            &next.get().frame as *const TrapFrame,
            switching,
        )
    };

    if switching {
        unsafe { switch::switch_frames(cur_frame, next_frame) };
    }
}

// ================================================================================================
// IDLE THREAD
// ================================================================================================

/// The idle thread: scheduled only when the ready queue is empty, never
/// queued itself.
///
/// Each pass blocks with interrupts off, and the scheduler special-cases
/// it back in when nothing else is runnable; on resume it re-enables
/// interrupts and halts in one `sti; hlt` pair, so a wakeup cannot slip
/// into the gap between the two instructions.
fn idle_main(aux: usize) {
    let started = unsafe { &*(aux as *const Semaphore) };
    IDLE.store(current().get() as *mut Tcb, Ordering::SeqCst);
    started.up();

    loop {
        interrupts::disable();
        block();
        x86_64::instructions::interrupts::enable_and_hlt();
    }
}

// ================================================================================================
// DIAGNOSTICS
// ================================================================================================

/// Snapshot of every live thread.
pub fn snapshot() -> Vec<ThreadInfo> {
    let old = interrupts::disable();
    let infos = SCHED
        .lock()
        .all
        .iter()
        .map(|t| {
            let tcb = t.get();
            ThreadInfo {
                tid: tcb.tid,
                name: tcb.name.clone(),
                status: tcb.status,
                priority: tcb.priority,
            }
        })
        .collect();
    interrupts::set_level(old);
    infos
}

/// Priority of the named thread, if it is alive. Test-suite helper.
pub fn priority_of(name: &str) -> Option<Priority> {
    let old = interrupts::disable();
    let found = SCHED
        .lock()
        .all
        .iter()
        .find(|t| t.get().name.as_str() == name)
        .map(|t| t.get().priority);
    interrupts::set_level(old);
    found
}

/// Whether the ready queue currently satisfies its ordering invariant.
pub fn ready_is_sorted() -> bool {
    let old = interrupts::disable();
    let sorted = SCHED.lock().ready.is_sorted();
    interrupts::set_level(old);
    sorted
}
