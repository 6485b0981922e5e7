//! Process Control Block
//!
//! The PCB is shared between the scheduler, the worker running it, and the
//! memory manager. Scalar fields that cross threads are atomics; compound
//! fields sit behind short spin-guarded sections. The scheduler's own mutex
//! decides *where* a PCB is; the PCB records *what* it is.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
};

use chrono::{DateTime, Local};
use spin::Mutex;

use crate::exec::Instruction;

use super::{memory::ProcessMemory, ProcessState};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

const NO_CORE: u32 = u32::MAX;

/// Process Control Block
pub struct Process {
    /// Process ID
    pub pid: ProcessId,
    /// Unique process name
    pub name: String,
    /// Flattened program; immutable once materialized
    pub commands: Vec<Instruction>,
    /// Wall-clock admission time
    pub start_time: DateTime<Local>,

    /// Current state (see [`ProcessState`])
    state: AtomicU32,
    /// Core index while RUNNING, `NO_CORE` otherwise
    assigned_core: AtomicU32,
    /// Index of the next instruction; `commands.len()` means complete
    program_counter: AtomicUsize,
    /// Instructions executed since the last dispatch
    executed_this_quantum: AtomicU32,
    /// Times this process has been placed on a core
    dispatch_count: AtomicU32,
    /// Ticks accumulated by SLEEP instructions
    sleep_ticks: AtomicU64,

    /// Wall-clock completion time
    finish_time: Mutex<Option<DateTime<Local>>>,
    /// Symbol table for DECLARE/ADD/SUBTRACT/READ
    pub variables: Mutex<BTreeMap<String, u16>>,
    /// Lines emitted by PRINT
    pub output_logs: Mutex<Vec<String>>,
    /// Memory metadata owned by the memory manager
    pub mem: Mutex<ProcessMemory>,
}

impl Process {
    /// Create a new PCB in the NEW state.
    pub fn new(pid: ProcessId, name: String, commands: Vec<Instruction>) -> Self {
        Self {
            pid,
            name,
            commands,
            start_time: Local::now(),
            state: AtomicU32::new(ProcessState::New as u32),
            assigned_core: AtomicU32::new(NO_CORE),
            program_counter: AtomicUsize::new(0),
            executed_this_quantum: AtomicU32::new(0),
            dispatch_count: AtomicU32::new(0),
            sleep_ticks: AtomicU64::new(0),
            finish_time: Mutex::new(None),
            variables: Mutex::new(BTreeMap::new()),
            output_logs: Mutex::new(Vec::new()),
            mem: Mutex::new(ProcessMemory::unallocated()),
        }
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u32(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state as u32, Ordering::Release);
    }

    /// Core index while RUNNING.
    pub fn assigned_core(&self) -> Option<usize> {
        match self.assigned_core.load(Ordering::Acquire) {
            NO_CORE => None,
            core => Some(core as usize),
        }
    }

    /// Called by the scheduler at dispatch: RUNNING on `core`, fresh quantum.
    pub fn dispatch_to(&self, core: usize) {
        self.set_state(ProcessState::Running);
        self.assigned_core.store(core as u32, Ordering::Release);
        self.executed_this_quantum.store(0, Ordering::Release);
        self.dispatch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear_core(&self) {
        self.assigned_core.store(NO_CORE, Ordering::Release);
    }

    pub fn program_counter(&self) -> usize {
        self.program_counter.load(Ordering::Acquire)
    }

    /// Advance past a successfully executed instruction.
    pub fn advance(&self) {
        self.program_counter.fetch_add(1, Ordering::AcqRel);
        self.executed_this_quantum.fetch_add(1, Ordering::AcqRel);
    }

    pub fn executed_this_quantum(&self) -> u32 {
        self.executed_this_quantum.load(Ordering::Acquire)
    }

    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count.load(Ordering::Relaxed)
    }

    /// True once every instruction has executed.
    pub fn is_complete(&self) -> bool {
        self.program_counter() >= self.commands.len()
    }

    pub fn record_sleep(&self, ticks: u64) {
        self.sleep_ticks.fetch_add(ticks, Ordering::Relaxed);
    }

    pub fn sleep_ticks(&self) -> u64 {
        self.sleep_ticks.load(Ordering::Relaxed)
    }

    /// Stamp completion; idempotent so a TERMINATED finalize cannot move it.
    pub fn mark_finished_at(&self, when: DateTime<Local>) {
        let mut finish = self.finish_time.lock();
        finish.get_or_insert(when);
    }

    pub fn finish_time(&self) -> Option<DateTime<Local>> {
        *self.finish_time.lock()
    }

    pub fn append_output(&self, line: String) {
        self.output_logs.lock().push(line);
    }

    /// The violation diagnostic, if this process was terminated by one.
    pub fn violation_diagnostic(&self) -> Option<String> {
        self.mem
            .lock()
            .violation
            .as_ref()
            .map(|v| v.diagnostic(&self.name))
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pc", &self.program_counter())
            .field("commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcb() -> Process {
        Process::new(ProcessId(1), "p01".into(), Vec::new())
    }

    #[test]
    fn dispatch_resets_quantum_and_assigns_core() {
        let p = pcb();
        p.advance();
        p.dispatch_to(3);
        assert_eq!(p.state(), ProcessState::Running);
        assert_eq!(p.assigned_core(), Some(3));
        assert_eq!(p.executed_this_quantum(), 0);
        assert_eq!(p.dispatch_count(), 1);
    }

    #[test]
    fn finish_time_is_set_once() {
        let p = pcb();
        let first = Local::now();
        p.mark_finished_at(first);
        p.mark_finished_at(first + chrono::Duration::seconds(10));
        assert_eq!(p.finish_time(), Some(first));
    }

    #[test]
    fn empty_program_is_complete() {
        assert!(pcb().is_complete());
    }
}
