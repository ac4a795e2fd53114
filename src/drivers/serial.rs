/*
 * 16550 UART Serial Driver
 *
 * Polled serial output on COM1, used as the sink for kernel logging.
 * Receive-side plumbing is intentionally absent; this port exists so the
 * kernel can talk, not listen.
 *
 * The port is guarded by a spin mutex. The logger only takes the lock with
 * interrupts disabled, so a timer tick can never preempt a thread that is
 * holding it and deadlock the next writer.
 */

use core::fmt;

use bitflags::bitflags;
use spin::Mutex;
use x86_64::instructions::port::Port;

bitflags! {
    /// Line status flags
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        // 1 to 4 unknown
        const OUTPUT_EMPTY = 1 << 5;
        // 6 and 7 unknown
    }
}

/// Serial port representation.
pub struct SerialPort {
    data: Port<u8>,       // Data register, read to receive, write to send
    int_en: Port<u8>,     // Interrupt enable
    fifo_ctrl: Port<u8>,  // FIFO control
    line_ctrl: Port<u8>,  // Line control
    modem_ctrl: Port<u8>, // Modem control
    line_sts: Port<u8>,   // Line status
}

impl SerialPort {
    /// Creates a new serial port instance at the given base I/O port.
    pub const fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// Initializes the serial port: 38400 baud, 8N1, FIFOs on.
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
    }

    fn line_sts(&mut self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(unsafe { self.line_sts.read() })
    }

    /// Sends a raw byte, spinning until the transmit holding register is free.
    pub fn send(&mut self, data: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {
            core::hint::spin_loop();
        }
        unsafe { self.data.write(data) }
    }

    /// Writes a byte with newline translation for serial consoles.
    pub fn write_byte(&mut self, b: u8) {
        match b {
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => {
                self.send(b);
            }
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.write_byte(b);
        }
        Ok(())
    }
}

/// Mutex-protected static instance of the COM1 serial port.
pub static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(0x3F8));

/// Initializes the log port (COM1).
///
/// This function should be called early in the boot process before any
/// logging occurs.
pub fn init() {
    COM1.lock().init();
}
