//! Per-core worker loop
//!
//! Each worker drives the process in its running slot one instruction at a
//! time. The scheduler mutex is only held to snapshot the slot and to move
//! the process between containers; execution and memory access run unlocked
//! against the PCB and the memory manager.

use std::{sync::Arc, thread, time::Duration};

use chrono::Local;
use log::{debug, info, trace};

use crate::{
    exec::{self, ExecOutcome},
    process::{Process, ProcessState},
};

use super::Scheduler;

/// Sleep between polls of an empty running slot.
const IDLE_INTERVAL: Duration = Duration::from_millis(25);

impl Scheduler {
    /// Worker thread body for `core`.
    pub fn run_worker(&self, core: usize) {
        debug!("worker for core {core} started");
        while !self.is_stopping() {
            let assigned = self.lock_state().running[core].clone();
            let Some(proc) = assigned else {
                self.metrics.record_idle_tick();
                thread::sleep(IDLE_INTERVAL);
                continue;
            };

            if proc.state() == ProcessState::Terminated || proc.is_complete() {
                self.finalize(core, &proc);
                continue;
            }

            let instruction = &proc.commands[proc.program_counter()];
            trace!(
                "core {core}: {} ({}) pc {}: {instruction}",
                proc.name,
                proc.pid,
                proc.program_counter()
            );
            match exec::execute(&proc, instruction, &self.mm) {
                ExecOutcome::Terminated => {
                    proc.set_state(ProcessState::Terminated);
                    if let Some(diagnostic) = proc.violation_diagnostic() {
                        let _console = self.console();
                        println!("\n{diagnostic}");
                    }
                    self.finalize(core, &proc);
                }
                ExecOutcome::Blocked => {
                    let mut st = self.lock_state();
                    proc.set_state(ProcessState::Blocked);
                    proc.clear_core();
                    st.blocked.push_back(Arc::clone(&proc));
                    st.running[core] = None;
                    drop(st);
                    self.cv.notify_all();
                    trace!(
                        "process {} ({}) blocked on a page fault at pc {}",
                        proc.name,
                        proc.pid,
                        proc.program_counter()
                    );
                }
                ExecOutcome::Advanced => {
                    self.metrics.record_active_tick();
                    proc.advance();
                    if self.config.delay_per_exec > 0 {
                        thread::sleep(Duration::from_millis(self.config.delay_per_exec));
                    }
                    if proc.is_complete() {
                        self.finalize(core, &proc);
                    } else if u64::from(proc.executed_this_quantum()) >= self.quantum {
                        let mut st = self.lock_state();
                        proc.set_state(ProcessState::Ready);
                        proc.clear_core();
                        st.ready.push_back(Arc::clone(&proc));
                        st.running[core] = None;
                        drop(st);
                        self.cv.notify_all();
                        trace!(
                            "quantum expired for process {} ({}) on core {core}",
                            proc.name,
                            proc.pid
                        );
                    }
                }
            }
        }
        debug!("worker for core {core} exiting");
    }

    /// Retire a process from `core`: record final state, release its frames,
    /// and wake the scheduler.
    fn finalize(&self, core: usize, proc: &Arc<Process>) {
        let final_state = if proc.state() == ProcessState::Terminated {
            ProcessState::Terminated
        } else {
            proc.set_state(ProcessState::Finished);
            ProcessState::Finished
        };
        proc.mark_finished_at(Local::now());
        proc.clear_core();

        {
            let mut st = self.lock_state();
            st.finished.push(Arc::clone(proc));
            st.running[core] = None;
        }
        self.mm.deallocate(proc);
        self.cv.notify_all();
        info!(
            "process {} ({}) retired as {final_state} after {}/{} instructions",
            proc.name,
            proc.pid,
            proc.program_counter(),
            proc.commands.len()
        );
    }
}
