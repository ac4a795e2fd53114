/*
 * System Timer
 *
 * Programs the 8254 PIT to fire IRQ 0 at TIMER_FREQ and maintains the
 * global tick counter. The tick is the kernel's unit of time: sleep
 * deadlines and the scheduling time slice are both measured in it.
 *
 * ### Interrupt path
 *
 * Each IRQ 0 increments the counter and hands the new time to
 * `thread::tick`, which does the per-tick scheduler work (tick accounting,
 * waking sleepers, slice expiry). This function runs in interrupt context
 * and must stay short; it never switches threads itself.
 *
 * ### Sleeping
 *
 * `sleep(n)` parks the calling thread on the sleep queue until the
 * absolute tick `now + n`; the thread consumes no CPU while parked.
 * Before the scheduler is started there is nothing to park on, so it
 * falls back to a busy wait.
 */

use core::sync::atomic::{AtomicI64, Ordering};

use x86_64::instructions::port::Port;

/// Timer interrupts per second.
pub const TIMER_FREQ: u32 = 100;

/// Ticks since the PIT was programmed.
static TICKS: AtomicI64 = AtomicI64::new(0);

/// Program the PIT: channel 0, rate generator, TIMER_FREQ interrupts/sec.
pub fn init() {
    let pit_frequency: u32 = 1_193_182; // Hz - PIT base frequency
    let divisor: u16 = (pit_frequency / TIMER_FREQ) as u16;

    log::info!("Initializing PIT with {}Hz (divisor: {})", TIMER_FREQ, divisor);

    unsafe {
        let mut command = Port::<u8>::new(0x43);
        let mut channel0 = Port::<u8>::new(0x40);

        // Channel 0, access mode lo/hi, mode 3 (square wave), binary
        command.write(0x36);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}

/// Ticks since boot.
pub fn ticks() -> i64 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `then`, which should be a previous `ticks()` value.
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

/// Suspend execution for approximately `n` timer ticks.
pub fn sleep(n: i64) {
    if n <= 0 {
        return;
    }
    let start = ticks();
    if crate::thread::started() {
        crate::thread::sleep_until(start + n);
    } else {
        // Scheduler not running yet; spin it out
        while elapsed(start) < n {
            core::hint::spin_loop();
        }
    }
}

/// Timer interrupt body, called from the IRQ 0 handler.
pub(crate) fn interrupt() {
    let now = TICKS.fetch_add(1, Ordering::SeqCst) + 1;
    crate::thread::tick(now);
}
