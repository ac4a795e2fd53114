/*
 * Thread Control Block
 *
 * This module defines the per-thread record and the handle type the rest
 * of the kernel uses to refer to threads.
 *
 * A thread's TCB lives at the base of its single 4 KiB page; the stack
 * occupies the rest of the page and grows down toward it. That layout is
 * what makes the running thread recoverable from the CPU alone: round the
 * stack pointer down to a page boundary and the TCB is right there. It is
 * also what makes stack overflow detectable: the first thing a runaway
 * stack tramples is the `magic` sentinel at the end of the struct, and
 * every access checks it.
 *
 *      4 kB +---------------------------------+
 *           |          kernel stack           |
 *           |               |                 |
 *           |               v                 |
 *           |         grows downward          |
 *           +---------------------------------+
 *           |              magic              |
 *           |               ...               |
 *           |              status             |
 *           |               tid               |
 *      0 kB +---------------------------------+
 */

use core::fmt;
use core::ptr::NonNull;

use crate::arch::x86_64::switch::TrapFrame;
use crate::memory::PGSIZE;
use crate::sync::Lock;

/// Sentinel written at TCB init and checked on every access. A mismatch
/// means the thread's stack grew into its own control block.
pub const THREAD_MAGIC: u64 = 0x7468_5f6d_6167_6963;

/// Capacity of the embedded thread name.
pub const NAME_CAP: usize = 16;

/// Capacity of the embedded donations set. Donors are live threads, so the
/// page pool bounds them well below this.
pub const DONOR_CAP: usize = 32;

/// Thread identifier, allocated monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tid(pub i64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}

/// Thread lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Scheduling priority. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    /// Lowest priority (the idle thread).
    pub const MIN: Priority = Priority(0);

    /// Default priority for new threads.
    pub const DEFAULT: Priority = Priority(31);

    /// Highest priority.
    pub const MAX: Priority = Priority(63);

    pub fn valid(self) -> bool {
        self >= Self::MIN && self <= Self::MAX
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-thread record, placed at the base of the thread's page.
///
/// The embedded collections are fixed-capacity (`heapless`) on purpose:
/// the page is freed without running drop glue, so the TCB must not own
/// heap storage.
pub struct Tcb {
    pub tid: Tid,
    pub name: heapless::String<NAME_CAP>,
    pub status: Status,

    /// Saved register state, loaded by the iretq restore sequence when the
    /// scheduler dispatches this thread.
    pub frame: TrapFrame,

    /// Effective priority: `init_priority` or the best donation, whichever
    /// is higher. This is the value scheduling decisions use.
    pub priority: Priority,

    /// Priority last set explicitly by the thread; the floor that
    /// recomputation falls back to when donations drain away.
    pub init_priority: Priority,

    /// Lock this thread is currently blocked on, if any.
    pub wait_on_lock: Option<NonNull<Lock>>,

    /// Threads waiting on locks this thread holds, each of which has
    /// donated its priority here. Ordering is established at read time.
    pub donations: heapless::Vec<ThreadRef, DONOR_CAP>,

    /// Absolute tick at which a sleeping thread becomes runnable again.
    pub wakeup_tick: i64,

    /// Top-level page table of the owning user process; null for kernel
    /// threads. Only tick accounting looks at it in this kernel.
    pub pml4: *mut u8,

    magic: u64,
}

// The TCB must leave most of the page for the stack.
const _: () = assert!(core::mem::size_of::<Tcb>() <= PGSIZE / 4);

impl Tcb {
    /// Write a fresh, blocked TCB at the base of `page`.
    ///
    /// # Safety
    ///
    /// `page` must be a zeroed, page-aligned region of at least PGSIZE
    /// bytes owned by the caller, with nothing live in it.
    pub unsafe fn init_at(page: NonNull<u8>, name: &str, priority: Priority) -> ThreadRef {
        debug_assert!(page.as_ptr() as usize % PGSIZE == 0);
        let tcb = page.cast::<Tcb>();
        unsafe {
            tcb.as_ptr().write(Tcb {
                tid: Tid(0),
                name: short_name(name),
                status: Status::Blocked,
                frame: TrapFrame::zeroed(),
                priority,
                init_priority: priority,
                wait_on_lock: None,
                donations: heapless::Vec::new(),
                wakeup_tick: 0,
                pml4: core::ptr::null_mut(),
                magic: THREAD_MAGIC,
            });
        }
        ThreadRef(tcb)
    }

    /// Invalidate the magic before the page returns to the pool, so a
    /// stale handle trips the sentinel check instead of reading garbage.
    pub(super) fn retire(&mut self) {
        self.magic = 0;
    }

    fn is_valid(&self) -> bool {
        self.magic == THREAD_MAGIC
    }
}

fn short_name(name: &str) -> heapless::String<NAME_CAP> {
    let mut s = heapless::String::new();
    for ch in name.chars() {
        if s.push(ch).is_err() {
            break;
        }
    }
    s
}

/// Handle to a live thread's TCB.
///
/// This is a relation, not ownership: the TCB is owned by its page, and
/// the handle stays valid until the scheduler reaps the thread. All
/// access happens on one CPU with interrupts disabled around mutation,
/// which is what the Send/Sync claims below lean on.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ThreadRef(NonNull<Tcb>);

unsafe impl Send for ThreadRef {}
unsafe impl Sync for ThreadRef {}

impl ThreadRef {
    pub(super) fn from_raw(ptr: NonNull<Tcb>) -> Self {
        Self(ptr)
    }

    /// Access the TCB, checking the stack-overflow sentinel.
    pub fn get(self) -> &'static mut Tcb {
        let tcb = unsafe { &mut *self.0.as_ptr() };
        assert!(
            tcb.is_valid(),
            "TCB sentinel clobbered: stack overflow in {}",
            tcb.tid
        );
        tcb
    }

    /// Base of the thread's page (which is also the TCB address).
    pub fn page(self) -> NonNull<u8> {
        self.0.cast()
    }

    /// Initial stack pointer for this thread's page.
    ///
    /// Eight bytes shy of the page end so a fresh thread enters its
    /// trampoline with the stack alignment a call would have produced.
    pub fn stack_top(self) -> u64 {
        self.0.as_ptr() as u64 + PGSIZE as u64 - 8
    }
}

impl fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tcb = unsafe { self.0.as_ref() };
        if tcb.is_valid() {
            f.debug_struct("ThreadRef")
                .field("tid", &tcb.tid)
                .field("name", &tcb.name)
                .field("status", &tcb.status)
                .field("priority", &tcb.priority)
                .finish()
        } else {
            write!(f, "ThreadRef(<retired {:p}>)", self.0)
        }
    }
}

/// Recover the running thread's TCB from the stack pointer.
///
/// The TCB sits at the base of the page the stack lives in, so masking
/// the low bits of RSP finds it. Valid from the moment `_start` moves RSP
/// onto the bootstrap thread's page.
pub(super) fn running_tcb() -> NonNull<Tcb> {
    let rsp: u64;
    unsafe {
        core::arch::asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
    }
    let base = rsp & !(PGSIZE as u64 - 1);
    // The mask of a stack pointer inside a live page is never null
    unsafe { NonNull::new_unchecked(base as *mut Tcb) }
}

/// Forge the handle for a thread that is already running on its page but
/// has no TCB yet (the bootstrap thread during `thread::init`).
pub(super) unsafe fn forge_running(name: &str, priority: Priority) -> ThreadRef {
    let page = running_tcb().cast::<u8>();
    let t = unsafe { Tcb::init_at(page, name, priority) };
    t.get().status = Status::Running;
    t
}
