//! Scheduler behavior tests
//!
//! Dispatch ordering, submission validation, containment, and the reporting
//! surface, driven through the public system API.

mod common;

use std::time::Duration;

use common::{base_config, boot, wait_for_retirement, wait_until};
use csopesy_emulator::{
    error::{EmulatorError, MemoryError, SchedError},
    exec::parse_program,
    sched::SchedPolicy,
};

fn tiny_program() -> String {
    r#"DECLARE x 1; ADD x x x; PRINT("bye")"#.to_string()
}

#[test]
fn fcfs_finishes_in_submission_order() {
    let mut config = base_config();
    config.scheduler = SchedPolicy::Fcfs;
    let system = boot("fifo", config);

    for name in ["one", "two", "three"] {
        system
            .submit_process(name, 64, Some(parse_program(&tiny_program()).unwrap()))
            .unwrap();
    }
    for name in ["one", "two", "three"] {
        wait_for_retirement(&system, name);
    }

    let finished = system.scheduler().snapshot().finished;
    let order: Vec<&str> = finished.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(order, ["one", "two", "three"]);

    system.shutdown();
}

#[test]
fn duplicate_names_are_rejected_at_submission() {
    let system = boot("dupname", base_config());
    system.submit_process("twin", 64, None).unwrap();
    assert!(matches!(
        system.submit_process("twin", 64, None),
        Err(EmulatorError::Sched(SchedError::DuplicateName { .. }))
    ));
    system.shutdown();
}

#[test]
fn invalid_sizes_are_rejected_before_enqueue() {
    let system = boot("badsize", base_config());
    for size in [0, 32, 100, 131072] {
        assert!(matches!(
            system.submit_process("sized", size, None),
            Err(EmulatorError::Memory(MemoryError::InvalidSize { .. }))
        ));
    }
    // The rejected submissions must not have burned the name.
    system.submit_process("sized", 64, None).unwrap();
    system.shutdown();
}

#[test]
fn empty_user_programs_are_rejected() {
    let system = boot("emptyprog", base_config());
    assert!(matches!(
        system.submit_process("hollow", 64, Some(Vec::new())),
        Err(EmulatorError::Sched(SchedError::ProgramTooLarge { count: 0 }))
    ));
    system.shutdown();
}

#[test]
fn every_created_process_is_accounted_for() {
    let system = boot("contain", base_config());
    for name in ["a", "b", "c"] {
        system
            .submit_process(name, 64, Some(parse_program(&tiny_program()).unwrap()))
            .unwrap();
        wait_for_retirement(&system, name);
    }

    let snapshot = system.scheduler().snapshot();
    let created = system.metrics().processes_created();
    let contained = snapshot.finished.len()
        + snapshot.ready_count
        + snapshot.blocked_count
        + snapshot.busy_cores();
    assert_eq!(contained as u64, created);

    system.shutdown();
}

#[test]
fn tick_counters_are_monotonic_and_active_work_is_counted() {
    let system = boot("ticks", base_config());

    let idle_before = system.metrics().idle_ticks();
    system
        .submit_process("worker", 64, Some(parse_program(&tiny_program()).unwrap()))
        .unwrap();
    wait_for_retirement(&system, "worker");

    assert!(system.metrics().active_ticks() >= 3);
    assert!(
        wait_until(Duration::from_secs(2), || {
            system.metrics().idle_ticks() > idle_before
        }),
        "idle core never ticked"
    );
    let total = system.metrics().total_ticks();
    assert_eq!(
        total,
        system.metrics().active_ticks() + system.metrics().idle_ticks()
    );

    system.shutdown();
}

#[test]
fn reports_render_the_scheduler_state() {
    let system = boot("reports", base_config());
    system
        .submit_process("shown", 64, Some(parse_program(&tiny_program()).unwrap()))
        .unwrap();
    wait_for_retirement(&system, "shown");

    let listing = system.screen_list();
    assert!(listing.contains("CPU Utilization:"));
    assert!(listing.contains("Finished processes:"));
    assert!(listing.contains("shown"));
    assert!(listing.contains("3 / 3"));

    let report = system.process_report("shown").expect("known process");
    assert!(report.contains("Process: shown"));
    assert!(report.contains("State: FINISHED"));
    assert!(report.contains("Instruction: 3 / 3"));
    assert!(report.contains("bye"));
    assert!(system.process_report("nobody").is_none());

    let vmstat = system.vmstat_report();
    assert!(vmstat.contains("Total memory     : 256 bytes"));
    assert!(vmstat.contains("Num paged in"));

    let smi = system.smi_report();
    assert!(smi.contains("PROCESS-SMI"));
    assert!(smi.contains("Memory Usage:"));

    system.shutdown();
}

#[test]
fn report_util_appends_to_the_log_file() {
    let system = boot("reportutil", base_config());
    let path = std::env::temp_dir().join(format!(
        "csopesy-report-test-{}.txt",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    system.append_report(&path).unwrap();
    system.append_report(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.matches("CPU Utilization:").count(), 2);

    system.shutdown();
}

#[test]
fn maker_flag_toggles() {
    let system = boot("maker", base_config());
    assert!(!system.scheduler().maker_running());
    system.start_generator();
    assert!(system.scheduler().maker_running());
    system.stop_generator();
    assert!(!system.scheduler().maker_running());
    system.shutdown();
}
