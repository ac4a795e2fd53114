/*
 * Interrupt Management Module
 *
 * This module provides utilities for managing CPU interrupts, including
 * enabling/disabling interrupts and checking interrupt status. It serves
 * as a high-level interface to x86_64 interrupt control instructions.
 *
 * Why this is important:
 * - Disabling interrupts is the one synchronization primitive the thread
 *   core relies on; every queue and TCB mutation happens under it
 * - Tracks whether the CPU is currently inside an external interrupt
 *   handler, which operations like yield and block must refuse
 * - Carries the deferred-yield flag: the timer tick may not switch threads
 *   itself, so it arms a yield that fires on the way out of the handler
 */

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;

/// Interrupt state of the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Maskable interrupts are delivered.
    On,
    /// Maskable interrupts are held off.
    Off,
}

/// Set while the CPU is running an external interrupt handler.
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// Set by the tick handler to request a thread yield on handler exit.
static YIELD_PENDING: AtomicBool = AtomicBool::new(false);

/// Current interrupt state.
pub fn get_level() -> Level {
    if interrupts::are_enabled() {
        Level::On
    } else {
        Level::Off
    }
}

/// Disable interrupts and return the previous state.
pub fn disable() -> Level {
    let old = get_level();
    interrupts::disable();
    old
}

/// Enable interrupts and return the previous state.
///
/// Must not be called from an interrupt handler; handlers run to
/// completion with interrupts masked.
pub fn enable() -> Level {
    assert!(
        !in_handler(),
        "interrupts cannot be enabled inside an interrupt handler"
    );
    let old = get_level();
    interrupts::enable();
    old
}

/// Restore a state previously returned by `disable` or `enable`.
pub fn set_level(level: Level) -> Level {
    match level {
        Level::On => enable(),
        Level::Off => disable(),
    }
}

/// True while executing an external interrupt handler.
pub fn in_handler() -> bool {
    IN_HANDLER.load(Ordering::SeqCst)
}

/// Request a thread yield once the current handler returns.
///
/// Only meaningful inside a handler; the tick path uses this at the end
/// of a time slice and when it wakes a sleeper that outranks the running
/// thread.
pub fn yield_on_return() {
    assert!(in_handler(), "deferred yield armed outside a handler");
    YIELD_PENDING.store(true, Ordering::SeqCst);
}

/// Mark handler entry. Called first thing by external interrupt handlers.
pub(crate) fn handler_enter() {
    debug_assert_eq!(get_level(), Level::Off);
    debug_assert!(!in_handler(), "external interrupts do not nest");
    IN_HANDLER.store(true, Ordering::SeqCst);
}

/// Mark handler exit and honor a pending deferred yield.
///
/// The yield runs after the in-handler flag drops, so the switched-out
/// thread parks with the interrupt frame still on its own stack; finishing
/// the handler and the iretq happen whenever it is next scheduled.
pub(crate) fn handler_exit() {
    IN_HANDLER.store(false, Ordering::SeqCst);
    if YIELD_PENDING.swap(false, Ordering::SeqCst) {
        crate::thread::yield_now();
    }
}
