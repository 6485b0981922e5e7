//! CPU scheduling
//!
//! One scheduler thread plus `C` worker threads share a single mutex-guarded
//! state block: the ready/blocked FIFOs, the per-core running slots, the
//! finished list, and the creation intake queue. FCFS and round-robin are one
//! scheduler parameterized by quantum; FCFS is round-robin that never
//! preempts.

mod generator;
mod metrics;
mod scheduler;
mod worker;

pub use metrics::CpuMetrics;
pub use scheduler::{SchedSnapshot, Scheduler};

use std::{collections::VecDeque, str::FromStr, sync::Arc};

use crate::{exec::Instruction, process::Process};

/// Scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// First come, first served: dispatch order only, no preemption.
    Fcfs,
    /// Round-robin with an instruction-count quantum.
    RoundRobin,
}

impl FromStr for SchedPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fcfs" => Ok(SchedPolicy::Fcfs),
            "rr" => Ok(SchedPolicy::RoundRobin),
            _ => Err(()),
        }
    }
}

impl core::fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            SchedPolicy::Fcfs => "fcfs",
            SchedPolicy::RoundRobin => "rr",
        })
    }
}

/// A request waiting in the creation queue.
#[derive(Debug)]
pub struct CreationRequest {
    pub name: String,
    pub size_bytes: usize,
    /// User-supplied program, or `None` for a generated one.
    pub commands: Option<Vec<Instruction>>,
}

/// Everything guarded by the scheduler mutex (`sched_lock`).
pub struct SchedState {
    pub creation_queue: VecDeque<CreationRequest>,
    pub ready: VecDeque<Arc<Process>>,
    pub blocked: VecDeque<Arc<Process>>,
    pub running: Vec<Option<Arc<Process>>>,
    pub finished: Vec<Arc<Process>>,
}

impl SchedState {
    fn new(cores: usize) -> Self {
        Self {
            creation_queue: VecDeque::new(),
            ready: VecDeque::new(),
            blocked: VecDeque::new(),
            running: vec![None; cores],
            finished: Vec::new(),
        }
    }

    /// Index of a free core, if any.
    pub fn free_core(&self) -> Option<usize> {
        self.running.iter().position(Option::is_none)
    }

    pub fn busy_cores(&self) -> usize {
        self.running.iter().filter(|slot| slot.is_some()).count()
    }

    /// No queued work and nothing on any core.
    pub fn is_quiescent(&self) -> bool {
        self.creation_queue.is_empty()
            && self.ready.is_empty()
            && self.blocked.is_empty()
            && self.busy_cores() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Process, ProcessId};

    fn pcb(pid: u64) -> Arc<Process> {
        Arc::new(Process::new(ProcessId(pid), format!("p{pid}"), Vec::new()))
    }

    #[test]
    fn free_core_prefers_the_lowest_slot() {
        let mut st = SchedState::new(3);
        assert_eq!(st.free_core(), Some(0));
        st.running[0] = Some(pcb(1));
        st.running[2] = Some(pcb(2));
        assert_eq!(st.free_core(), Some(1));
        assert_eq!(st.busy_cores(), 2);
    }

    #[test]
    fn quiescence_requires_empty_queues_and_cores() {
        let mut st = SchedState::new(1);
        assert!(st.is_quiescent());

        st.ready.push_back(pcb(1));
        assert!(!st.is_quiescent());
        let proc = st.ready.pop_front().unwrap();

        st.running[0] = Some(proc);
        assert!(!st.is_quiescent());
        st.running[0] = None;

        st.finished.push(pcb(2));
        assert!(st.is_quiescent(), "finished processes do not block quiescence");
    }

    #[test]
    fn policy_parses_from_config_values() {
        assert_eq!("fcfs".parse(), Ok(SchedPolicy::Fcfs));
        assert_eq!("rr".parse(), Ok(SchedPolicy::RoundRobin));
        assert!("sjf".parse::<SchedPolicy>().is_err());
    }
}
