//! Memory subsystem tests at the system level
//!
//! Paging under contention, frame accounting, and backing-store growth,
//! observed while the scheduler is live.

mod common;

use std::time::Duration;

use common::{base_config, boot, wait_for_process, wait_for_retirement, wait_until};
use csopesy_emulator::{exec::parse_program, process::ProcessState};

#[test]
fn paging_contention_drains_without_leaking_frames() {
    let mut config = base_config();
    config.num_cpu = 2;
    config.quantum_cycles = 3;
    config.max_overall_mem = 128; // two frames for four two-page processes
    let system = boot("contention", config);

    let program = r#"WRITE 0x0 7; WRITE 0x40 9; READ a 0x0; READ b 0x40; ADD c a b; PRINT("c=" + c)"#;
    for name in ["pg1", "pg2", "pg3", "pg4"] {
        system
            .submit_process(name, 128, Some(parse_program(program).unwrap()))
            .unwrap();
    }
    for name in ["pg1", "pg2", "pg3", "pg4"] {
        let proc = wait_for_retirement(&system, name);
        assert_eq!(proc.state(), ProcessState::Finished);
        assert_eq!(proc.output_logs.lock().as_slice(), ["c=16"]);
    }

    let stats = system.memory().stats();
    assert!(stats.pages_paged_in() >= 8, "every page faulted in at least once");
    assert!(stats.pages_paged_out() >= 1, "contention must evict");
    assert_eq!(system.memory().used_bytes(), 0);

    system.shutdown();
}

#[test]
fn frame_accounting_always_balances() {
    let mut config = base_config();
    config.max_overall_mem = 128;
    let system = boot("balance", config);

    let program = parse_program("WRITE 0x0 1; WRITE 0x40 2; READ x 0x0").unwrap();
    system.submit_process("holder", 128, Some(program)).unwrap();
    wait_for_process(&system, "holder");

    // Sampled while the process runs and again after it retires.
    for _ in 0..20 {
        let used = system.memory().used_bytes();
        let free = system.memory().free_bytes();
        assert_eq!(used + free, system.memory().total_bytes());
        assert_eq!(used % system.memory().frame_size(), 0);
        std::thread::sleep(Duration::from_millis(2));
    }

    wait_for_retirement(&system, "holder");
    assert!(wait_until(Duration::from_secs(5), || {
        system.memory().used_bytes() == 0
    }));

    system.shutdown();
}

#[test]
fn backing_store_grows_with_each_admission() {
    let system = boot("storegrowth", base_config());

    system
        .submit_process("small", 64, Some(parse_program("WRITE 0x0 5").unwrap()))
        .unwrap();
    system
        .submit_process("large", 128, Some(parse_program("WRITE 0x0 6").unwrap()))
        .unwrap();
    wait_for_retirement(&system, "small");
    wait_for_retirement(&system, "large");

    // Reservations are append-only and never reclaimed.
    assert_eq!(system.memory().backing_store_len(), 64 + 128);

    system.shutdown();
}

#[test]
fn paging_counters_never_decrease() {
    let mut config = base_config();
    config.max_overall_mem = 64;
    let system = boot("monotonic", config);

    let program = r#"WRITE 0x0 1; WRITE 0x40 2; READ x 0x0; READ y 0x40"#;
    system
        .submit_process("churn", 128, Some(parse_program(program).unwrap()))
        .unwrap();

    let mut last_in = 0;
    let mut last_out = 0;
    let stats = system.memory().stats();
    for _ in 0..50 {
        let now_in = stats.pages_paged_in();
        let now_out = stats.pages_paged_out();
        assert!(now_in >= last_in);
        assert!(now_out >= last_out);
        last_in = now_in;
        last_out = now_out;
        std::thread::sleep(Duration::from_millis(2));
    }

    wait_for_retirement(&system, "churn");
    system.shutdown();
}
