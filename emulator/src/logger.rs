//! Leveled stderr logger behind the `log` facade
//!
//! The shell owns stdout; diagnostics go to stderr so interactive output and
//! logging never interleave on the same stream.

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now().format("%H:%M:%S%.3f");
        let thread = std::thread::current();
        let mut err = std::io::stderr().lock();
        // Best effort; a dead stderr must not take the emulator down.
        let _ = writeln!(
            err,
            "[{now}] {:5} [{}] {}",
            record.level(),
            thread.name().unwrap_or("?"),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the logger. Safe to call more than once; later calls only adjust
/// the level filter.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
