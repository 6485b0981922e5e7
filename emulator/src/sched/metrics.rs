//! CPU tick accounting
//!
//! A tick is one executed instruction (active) or one idle loop pass on an
//! unassigned core (idle). Counters are monotonic and lock-free; `vmstat`
//! reads them racily by design.

use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler-wide counters.
#[derive(Debug, Default)]
pub struct CpuMetrics {
    active_ticks: AtomicU64,
    idle_ticks: AtomicU64,
    processes_created: AtomicU64,
    dispatches: AtomicU64,
}

impl CpuMetrics {
    pub const fn new() -> Self {
        Self {
            active_ticks: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            processes_created: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn record_active_tick(&self) {
        self.active_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_tick(&self) {
        self.idle_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_process_created(&self) {
        self.processes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_ticks.load(Ordering::Relaxed)
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks.load(Ordering::Relaxed)
    }

    pub fn total_ticks(&self) -> u64 {
        self.active_ticks() + self.idle_ticks()
    }

    pub fn processes_created(&self) -> u64 {
        self.processes_created.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_combine_active_and_idle() {
        let metrics = CpuMetrics::new();
        metrics.record_active_tick();
        metrics.record_active_tick();
        metrics.record_idle_tick();
        assert_eq!(metrics.active_ticks(), 2);
        assert_eq!(metrics.idle_ticks(), 1);
        assert_eq!(metrics.total_ticks(), 3);
    }
}
