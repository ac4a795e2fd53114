/*
 * x86_64 Architecture Support Module
 *
 * This module contains all x86_64-specific code for the Strand kernel.
 * It provides the low-level architecture support needed for proper
 * kernel operation on x86_64 processors.
 *
 * Why this is important:
 * - Encapsulates all architecture-specific functionality
 * - Provides clean separation between generic kernel code and x86_64 specifics
 * - Contains the register save/restore leaf the scheduler depends on
 * - Manages CPU-specific tables (GDT, IDT) and the interrupt mask
 *
 * Submodules:
 * - gdt: Global Descriptor Table management
 * - idt: Interrupt Descriptor Table and exception handling
 * - interrupts: Interrupt control utilities and deferred-yield plumbing
 * - switch: Saved register frame and the iretq context-switch routine
 */

pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod switch;
