/*
 * Global Descriptor Table (GDT) Implementation
 *
 * x86_64 runs a flat memory model, but the GDT still matters to this
 * kernel in two places:
 *
 * 1. Segment selectors: every forged thread frame carries CS and SS
 *    values, and the iretq restore faults unless they name descriptors
 *    in this table.
 * 2. Task State Segment (TSS): supplies the interrupt stack the
 *    double-fault handler runs on. Thread stacks here are a single page
 *    with the TCB at the bottom, so the likeliest double fault is a
 *    thread stack gone bad; the handler needs ground of its own to
 *    stand on while it reports that.
 *
 * Ring 0 only. This kernel has no user segments.
 */

use lazy_static::lazy_static;
use x86_64::{
    VirtAddr,
    structures::{
        gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector},
        tss::TaskStateSegment,
    },
};

use crate::memory::PGSIZE;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Emergency stack for the double-fault handler, one page like every
/// thread stack. It deliberately lives outside the page pool: when this
/// stack is in use, some thread's page can no longer be trusted.
#[repr(C, align(4096))]
struct DoubleFaultStack([u8; PGSIZE]);

static mut DOUBLE_FAULT_STACK: DoubleFaultStack = DoubleFaultStack([0; PGSIZE]);

/// Selectors the thread subsystem bakes into every forged frame.
#[derive(Debug, Clone, Copy)]
pub struct KernelSelectors {
    pub code: SegmentSelector,
    pub data: SegmentSelector,
}

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        // Stacks grow down; the IST entry wants the high end of the page
        let base = VirtAddr::from_ptr(&raw const DOUBLE_FAULT_STACK);
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = base + PGSIZE as u64;
        tss
    };
}

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, KernelSelectors, SegmentSelector) = {
        let mut gdt = GlobalDescriptorTable::new();
        let code = gdt.append(Descriptor::kernel_code_segment());
        let data = gdt.append(Descriptor::kernel_data_segment());
        let tss = gdt.append(Descriptor::tss_segment(&TSS));
        (gdt, KernelSelectors { code, data }, tss)
    };
}

/// Load the GDT and TSS and point every segment register at the kernel
/// descriptors.
///
/// Must run before the IDT is installed: the double-fault gate names the
/// IST slot this sets up.
pub fn init() {
    use x86_64::instructions::{
        segmentation::{CS, DS, ES, FS, GS, SS, Segment},
        tables::load_tss,
    };

    GDT.0.load();
    let sel = GDT.1;

    unsafe {
        // Flat model: one kernel code descriptor for CS, the kernel data
        // descriptor for everything else
        CS::set_reg(sel.code);
        SS::set_reg(sel.data);
        DS::set_reg(sel.data);
        ES::set_reg(sel.data);
        FS::set_reg(sel.data);
        GS::set_reg(sel.data);
        load_tss(GDT.2);
    }

    log::info!(
        "GDT loaded: kernel cs={:#x} ss={:#x}, double-fault IST armed",
        sel.code.0,
        sel.data.0
    );
}

/// Selectors for forged thread frames.
pub fn kernel_selectors() -> KernelSelectors {
    GDT.1
}
