/*
 * Context Switch Leaf
 *
 * This module defines the saved register frame and the single assembly
 * routine that moves the CPU from one kernel thread to another.
 *
 * The frame mirrors what an interrupt delivers: fifteen general-purpose
 * registers followed by the five-word iretq frame (RIP, CS, RFLAGS, RSP,
 * SS). A thread is resumed by pointing RSP at its saved frame, popping the
 * general registers, and executing iretq. A brand-new thread is launched
 * the same way: its creator forges a frame whose RIP is the kernel-thread
 * trampoline, so the very first dispatch is indistinguishable from any
 * later one.
 *
 * CONTRACT: `switch_frames` must remain a leaf with no compiler-generated
 * prologue, probes, or instrumentation. Any stack canary, sanitizer shim,
 * or inserted spill would corrupt the in-flight frame, which is why it is
 * a naked function and why the field offsets are pinned by const asserts
 * below. Callers must have interrupts disabled.
 */

use core::arch::naked_asm;
use core::mem::{offset_of, size_of};

/// Interrupt-enable bit in RFLAGS.
pub const RFLAGS_IF: u64 = 1 << 9;

/// Bit 1 of RFLAGS is reserved and always reads as one.
pub const RFLAGS_RESERVED: u64 = 1 << 1;

/// Saved register state of a suspended thread.
///
/// Layout is hardware-defined: the tail of the struct is exactly the frame
/// iretq consumes, and the head is the pop sequence in `switch_frames`.
/// `#[repr(C)]` pins the field order.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    // General purpose registers, restored by fifteen pops
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    // iretq frame, consumed by the CPU
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }
}

// The assembly below addresses the frame by numeric offset; these pin the
// layout so a reordered field fails the build instead of corrupting state.
const _: () = assert!(offset_of!(TrapFrame, r15) == 0x00);
const _: () = assert!(offset_of!(TrapFrame, rbp) == 0x40);
const _: () = assert!(offset_of!(TrapFrame, rdi) == 0x48);
const _: () = assert!(offset_of!(TrapFrame, rsi) == 0x50);
const _: () = assert!(offset_of!(TrapFrame, rax) == 0x70);
const _: () = assert!(offset_of!(TrapFrame, rip) == 0x78);
const _: () = assert!(offset_of!(TrapFrame, cs) == 0x80);
const _: () = assert!(offset_of!(TrapFrame, rflags) == 0x88);
const _: () = assert!(offset_of!(TrapFrame, rsp) == 0x90);
const _: () = assert!(offset_of!(TrapFrame, ss) == 0x98);
const _: () = assert!(size_of::<TrapFrame>() == 0xA0);

/// Suspend the running thread into `cur` and resume the thread saved in
/// `next`.
///
/// The current register file, flags, and a continuation RIP (the local
/// label just before the final `ret`) are stored into `cur`. Then RSP is
/// pointed at `next`, the fifteen general registers are popped, and iretq
/// loads RIP/CS/RFLAGS/RSP/SS in one shot. When some later switch resumes
/// `cur`, execution continues at that continuation label and falls out of
/// this function as if the call had returned normally.
///
/// # Safety
///
/// Interrupts must be disabled. `cur` must be the frame of the thread
/// executing this call and `next` a frame that was either saved by a prior
/// call or forged for a fresh thread. Neither may be aliased concurrently.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_frames(cur: *mut TrapFrame, next: *const TrapFrame) {
    naked_asm!(
        // Save the outgoing thread's registers into *cur (rdi)
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r11",
        "mov [rdi + 0x28], r10",
        "mov [rdi + 0x30], r9",
        "mov [rdi + 0x38], r8",
        "mov [rdi + 0x40], rbp",
        "mov [rdi + 0x48], rdi",
        "mov [rdi + 0x50], rsi",
        "mov [rdi + 0x58], rdx",
        "mov [rdi + 0x60], rcx",
        "mov [rdi + 0x68], rbx",
        "mov [rdi + 0x70], rax",

        // Continuation: resume at the local label below, with the stack
        // still holding our caller's return address
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x78], rax",
        "mov rax, cs",
        "mov [rdi + 0x80], rax",
        "pushfq",
        "pop rax",
        "mov [rdi + 0x88], rax",
        "mov rax, rsp",
        "mov [rdi + 0x90], rax",
        "mov rax, ss",
        "mov [rdi + 0x98], rax",

        // Load the incoming thread: point RSP at its saved frame, pop the
        // general registers, and let iretq consume the rest
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "iretq",

        // A suspended thread re-enters here once rescheduled
        "2:",
        "ret",
    )
}
