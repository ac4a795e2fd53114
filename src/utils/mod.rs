/*
 * Kernel Utilities and Support Functions
 *
 * Support code used throughout the kernel.
 *
 * Key components:
 * - logger: Structured logging system for kernel messages
 */

pub mod logger;
