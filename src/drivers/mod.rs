/*
 * Device Drivers
 *
 * The small set of devices this kernel touches:
 * - serial: 16550 UART on COM1, the log sink
 * - pic: chained 8259 interrupt controllers
 * - timer: 8253/8254 PIT programmed to the kernel tick frequency
 */

pub mod pic;
pub mod serial;
pub mod timer;
