//! Shared fixtures for integration tests

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use csopesy_emulator::{
    process::Process,
    sched::SchedPolicy,
    system::System,
    Config,
};

/// A config for small, fast scenarios; tests override fields as needed.
pub fn base_config() -> Config {
    Config {
        num_cpu: 1,
        scheduler: SchedPolicy::RoundRobin,
        quantum_cycles: 4,
        batch_process_freq: 50,
        min_ins: 3,
        max_ins: 6,
        delay_per_exec: 0,
        max_overall_mem: 256,
        mem_per_frame: 64,
        min_mem_per_proc: 64,
        max_mem_per_proc: 128,
    }
}

/// Boot a system against a unique backing-store file under the temp dir.
pub fn boot(tag: &str, config: Config) -> Arc<System> {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let path: PathBuf = std::env::temp_dir().join(format!(
        "csopesy-it-{tag}-{}-{}.bin",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    System::initialize_with_store(config, &path).expect("system initializes")
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

/// Wait for a process to be admitted and return its PCB.
pub fn wait_for_process(system: &System, name: &str) -> Arc<Process> {
    assert!(
        wait_until(Duration::from_secs(5), || system
            .processes()
            .get(name)
            .is_some()),
        "process '{name}' was never admitted"
    );
    system.processes().get(name).expect("process admitted")
}

/// Wait for a process to leave the live states.
pub fn wait_for_retirement(system: &System, name: &str) -> Arc<Process> {
    let proc = wait_for_process(system, name);
    assert!(
        wait_until(Duration::from_secs(10), || !proc.state().is_live()),
        "process '{name}' never retired (state {:?})",
        proc.state()
    );
    proc
}
