//! Monotonic emulator clock
//!
//! Eviction ordering and memory-creation stamps need a monotonic time source;
//! wall-clock time can step backwards under NTP. Everything is measured from
//! the first observation of the clock.

use std::time::Instant;

use lazy_static::lazy_static;

lazy_static! {
    static ref BOOT: Instant = Instant::now();
}

/// Nanoseconds since the emulator clock was first read.
pub fn monotonic_ns() -> u64 {
    BOOT.elapsed().as_nanos() as u64
}
