/*
 * 8259 Programmable Interrupt Controller
 *
 * Remaps the two chained legacy PICs away from the CPU exception vectors
 * and unmasks only the timer line. Everything else stays masked: the
 * thread core is driven entirely by IRQ 0.
 */

use pic8259::ChainedPics;
use spin::Mutex;

/// IDT vector where IRQ 0 lands after remapping.
pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remap the PICs and unmask the timer interrupt (IRQ 0).
///
/// Called with interrupts still disabled during boot.
pub fn init() {
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        // Mask everything except IRQ 0 on the master; mask the slave fully
        pics.write_masks(0xFE, 0xFF);
    }
    log::info!("PIC remapped to vectors {}..{}", PIC_1_OFFSET, PIC_1_OFFSET + 16);
}

/// Acknowledge an IRQ so the PIC will deliver the next one.
///
/// Safe to call from interrupt handlers; interrupts are masked there, so
/// the lock can never be contended against a preempted holder.
pub fn end_of_interrupt(irq: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET + irq);
    }
}
