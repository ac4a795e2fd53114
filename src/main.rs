/*
 * Strand Kernel Main Entry Point
 *
 * This is the main entry point for the Strand kernel, a small x86-64
 * teaching kernel built around a preemptive, priority-scheduled thread
 * subsystem with priority donation.
 *
 * Why this is important:
 * - Provides the `_start` the loader jumps to
 * - Moves onto the bootstrap thread's stack page before any Rust runs,
 *   which is what makes the current-thread-from-RSP trick valid from the
 *   first instruction of kstart
 * - Coordinates the overall kernel initialization sequence
 * - Implements panic handling for kernel-level errors
 */

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
#![allow(dead_code)]

extern crate alloc;

use core::panic::PanicInfo;

mod arch;
mod drivers;
mod memory;
mod sync;
mod tests;
mod thread;
mod utils;

/// The bootstrap thread's page: TCB at the base, boot stack on top.
/// `thread::init` forges the TCB once Rust is running.
#[repr(C, align(4096))]
pub struct BootThreadPage([u8; memory::PGSIZE]);

#[unsafe(no_mangle)]
pub static mut BOOT_THREAD_PAGE: BootThreadPage = BootThreadPage([0; memory::PGSIZE]);

/// Boot command line, patched in place by the loader. NUL-terminated.
/// The only option the core recognizes is `-o mlfqs`.
#[unsafe(no_mangle)]
pub static mut BOOT_COMMAND_LINE: [u8; 128] = [0; 128];

/// ===============================
///  EARLY ENTRY POINT (_start)
/// ===============================
///
/// Called by the loader with interrupts disabled. Required to:
///   - Switch onto the bootstrap thread's stack page
///   - Call into Rust's `kstart`
///
/// The stack pointer lands eight bytes shy of the page end so `kstart`
/// begins with the alignment a call would have produced.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "lea rax, [rip + BOOT_THREAD_PAGE]",
        "add rax, {stack_top}",
        "mov rsp, rax",
        "jmp kstart",
        stack_top = const memory::PGSIZE - 8,
    );
}

/// ===============================
///  RUST KERNEL ENTRY POINT
/// ===============================
///
/// Runs on the bootstrap thread's page; after `thread::init` this code
/// simply *is* the first thread.
#[unsafe(no_mangle)]
pub extern "C" fn kstart() -> ! {
    // Step 1: Bring up the serial port and logging first
    drivers::serial::init();
    utils::logger::init();
    log::info!("Strand kernel starting...");

    // Step 2: CPU tables. IDT before interrupts ever fire
    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();

    // Step 3: Memory (heap, thread page pool)
    memory::init();

    // Step 4: Turn the boot code into the first thread
    thread::init();

    // Step 5: Interrupt controller and timer, still masked at the CPU
    drivers::pic::init();
    drivers::timer::init();

    // Step 6: Boot options
    parse_boot_options();

    // Step 7: Start preemptive scheduling (enables interrupts)
    thread::start();
    log::info!("Kernel initialization complete");

    // The bootstrap thread drives the scenario suite, then parks
    tests::run_all();

    log::info!("Nothing left to run; bootstrap thread idling");
    loop {
        x86_64::instructions::hlt();
    }
}

/// Parse the loader-provided command line.
///
/// Only `-o mlfqs` means anything to the core: it selects the alternate
/// scheduler policy, which this kernel records but does not ship.
fn parse_boot_options() {
    let raw = unsafe { &*core::ptr::addr_of!(BOOT_COMMAND_LINE) };
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let Ok(cmdline) = core::str::from_utf8(&raw[..len]) else {
        log::warn!("Boot command line is not UTF-8; ignored");
        return;
    };

    let mut args = cmdline.split_whitespace();
    while let Some(arg) = args.next() {
        match arg {
            "-o" => match args.next() {
                Some("mlfqs") => {
                    thread::set_mlfqs(true);
                    log::info!("Boot option: mlfqs scheduler requested (not built; strict-priority stays active)");
                }
                Some(other) => log::warn!("Unknown -o option '{}'", other),
                None => log::warn!("-o with no option"),
            },
            other => log::warn!("Unknown boot argument '{}'", other),
        }
    }
}

///  PANIC HANDLER
/// ===============================
///
/// Logging may fail early, but this is safe once the logger is up.
///
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    // The panicking thread may hold the serial lock itself; break it so
    // the report gets out
    unsafe { drivers::serial::COM1.force_unlock() };

    if let Some(location) = info.location() {
        log::error!(
            "PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        x86_64::instructions::hlt();
    }
}
