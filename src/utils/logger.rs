use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};

use crate::drivers::serial;

/// Logger backend writing to the COM1 serial port.
struct SerialLogger;

impl log::Log for SerialLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    /// Logs the record by printing it to the serial port.
    ///
    /// The port lock is taken with interrupts masked: a timer tick that
    /// preempted a logging thread mid-line would otherwise spin forever
    /// on this CPU the next time anything logged.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            x86_64::instructions::interrupts::without_interrupts(|| {
                let _ = writeln!(
                    serial::COM1.lock(),
                    "[{}] {}",
                    record.level(),
                    record.args()
                );
            });
        }
    }

    /// Flushes the logger (no-op; the port is polled).
    fn flush(&self) {}
}

/// The logger instance used for logging.
static LOGGER: SerialLogger = SerialLogger;

/// Initializes the logger.
///
/// # Panics
///
/// If a logger was already installed, which would mean init ran twice.
pub fn init() {
    match log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info)) {
        Ok(_) => log::info!("Logger initialized"),
        Err(err) => panic!("Error initializing logger: {}", err),
    }
}
