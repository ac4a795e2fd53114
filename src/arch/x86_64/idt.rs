/*
 * Interrupt Descriptor Table (IDT) Implementation
 *
 * The Interrupt Descriptor Table (IDT) defines how the CPU handles
 * interrupts and exceptions. It is a table of function pointers the CPU
 * consults when a specific event occurs.
 *
 * Structure:
 * - Entries 0-31 are reserved for CPU exceptions (divide error, page fault,
 *   double fault, ...)
 * - Entries 32-47 carry the remapped legacy IRQs; IRQ 0 (entry 32) is the
 *   timer tick that drives preemption and timed sleep
 *
 * The timer entry is the only one the thread subsystem depends on: it
 * brackets the tick with handler_enter/handler_exit so the deferred-yield
 * contract holds (the handler itself never switches threads; the switch
 * fires on the way out).
 *
 * Exceptions indicate kernel bugs in this kernel (there is no user space
 * to blame), so every exception handler panics with enough context to
 * debug the fault.
 */

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

use crate::arch::x86_64::interrupts;
use crate::drivers::pic;

/// IDT vector of the first remapped IRQ (IRQ 0 = timer).
pub const IRQ_BASE: u8 = pic::PIC_1_OFFSET;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        // Exception handlers
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.debug.set_handler_fn(debug_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available.set_handler_fn(device_not_available_handler);
        // Double fault gets its own stack via the IST so a corrupted thread
        // stack still produces a diagnosable panic
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss_handler);
        idt.segment_not_present.set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);

        // Hardware interrupt handlers (IRQ 0-15 map to vectors 32-47)
        idt[IRQ_BASE].set_handler_fn(timer_interrupt_handler); // IRQ 0 - Timer
        idt[IRQ_BASE + 7].set_handler_fn(spurious_interrupt_handler); // IRQ 7
        idt[IRQ_BASE + 15].set_handler_fn(spurious_interrupt_handler); // IRQ 15

        idt
    };
}

/// Initialize the Interrupt Descriptor Table
///
/// Must be called early in the boot process, before interrupts are enabled.
pub fn init() {
    log::info!("Loading IDT...");
    IDT.load();
    log::info!("IDT initialized successfully");
}

// Hardware interrupt handlers

/// Timer tick (IRQ 0).
///
/// Counts the tick and runs the thread subsystem's per-tick work. The EOI
/// goes out before handler_exit so a deferred yield cannot leave the timer
/// line masked while another thread runs.
extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    interrupts::handler_enter();
    crate::drivers::timer::interrupt();
    pic::end_of_interrupt(0);
    interrupts::handler_exit();
}

extern "x86-interrupt" fn spurious_interrupt_handler(_stack_frame: InterruptStackFrame) {
    // Spurious IRQ from the 8259; acknowledge conservatively on both PICs
    pic::end_of_interrupt(15);
}

// Exception handlers - these functions are called when CPU exceptions occur

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: DIVIDE ERROR\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn debug_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: DEBUG\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn nmi_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: NON-MASKABLE INTERRUPT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: OVERFLOW\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn bound_range_exceeded_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: BOUND RANGE EXCEEDED\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: INVALID OPCODE\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: DEVICE NOT AVAILABLE\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!(
        "EXCEPTION: DOUBLE FAULT (error code {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn invalid_tss_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    panic!(
        "EXCEPTION: INVALID TSS (error code {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn segment_not_present_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: SEGMENT NOT PRESENT (error code {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn stack_segment_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: STACK SEGMENT FAULT (error code {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code {})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: x86_64::structures::idt::PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    // CR2 always holds the faulting address; if even that read fails the
    // machine state is beyond diagnosis
    let fault_addr = Cr2::read();

    panic!(
        "EXCEPTION: PAGE FAULT at {:?} (error code {:?})\n{:#?}",
        fault_addr, error_code, stack_frame
    );
}
