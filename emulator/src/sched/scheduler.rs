//! The scheduler
//!
//! Owns `sched_lock` (state mutex + condition variable) and the scheduler
//! thread loop: drain creation intake, service blocked processes, dispatch to
//! free cores. Worker and generator loops live in sibling modules but run
//! against this same structure.
//!
//! Lock order: `sched_lock` -> `mem_lock` -> `dir_lock`. Workers never hold
//! `sched_lock` across instruction execution or memory access.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
};

use log::{debug, error, info, trace, warn};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    config::Config,
    error::{EmulatorError, MemoryError, SchedError},
    exec::Instruction,
    mm::{is_valid_proc_mem, MemoryManager},
    process::{Process, ProcessId, ProcessState, ProcessTable},
};

use super::{generator, CpuMetrics, CreationRequest, SchedState};

/// Point-in-time view of the scheduler state for reporting.
pub struct SchedSnapshot {
    pub running: Vec<Option<Arc<Process>>>,
    pub ready_count: usize,
    pub blocked_count: usize,
    pub finished: Vec<Arc<Process>>,
}

impl SchedSnapshot {
    pub fn busy_cores(&self) -> usize {
        self.running.iter().filter(|slot| slot.is_some()).count()
    }

    /// Busy cores over total cores, percent.
    pub fn cpu_utilization(&self) -> u32 {
        if self.running.is_empty() {
            return 0;
        }
        (self.busy_cores() * 100 / self.running.len()) as u32
    }
}

/// The policy-parameterized scheduler.
pub struct Scheduler {
    pub(super) config: Arc<Config>,
    /// Instruction quantum; `u64::MAX` under FCFS.
    pub(super) quantum: u64,
    pub(super) state: Mutex<SchedState>,
    pub(super) cv: Condvar,
    /// Threads exit their loops once set.
    pub(super) stop: AtomicBool,
    /// Cleared at shutdown so no new creation requests are accepted.
    intake_open: AtomicBool,
    /// Toggled by scheduler-start / scheduler-stop.
    pub(super) maker_running: AtomicBool,
    next_pid: AtomicU64,
    pub metrics: CpuMetrics,
    /// `cout_lock`: serializes the few console writes the core owns.
    console: Mutex<()>,
    pub(super) mm: Arc<MemoryManager>,
    table: Arc<ProcessTable>,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, mm: Arc<MemoryManager>, table: Arc<ProcessTable>) -> Self {
        let quantum = config.effective_quantum();
        let cores = config.num_cpu;
        Self {
            config,
            quantum,
            state: Mutex::new(SchedState::new(cores)),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
            intake_open: AtomicBool::new(true),
            maker_running: AtomicBool::new(false),
            next_pid: AtomicU64::new(1),
            metrics: CpuMetrics::new(),
            console: Mutex::new(()),
            mm,
            table,
        }
    }

    /// Queue a creation request. Size and name are validated here, before the
    /// request is enqueued; the PCB is materialized by the scheduler thread.
    pub fn submit(
        &self,
        name: &str,
        size_bytes: usize,
        commands: Option<Vec<Instruction>>,
    ) -> Result<(), EmulatorError> {
        if !self.intake_open.load(Ordering::Acquire) {
            return Err(SchedError::ShuttingDown.into());
        }
        if !is_valid_proc_mem(size_bytes) {
            return Err(MemoryError::InvalidSize {
                requested: size_bytes,
            }
            .into());
        }
        if matches!(&commands, Some(cmds) if cmds.is_empty()) {
            return Err(SchedError::ProgramTooLarge { count: 0 }.into());
        }
        self.table.reserve(name)?;

        let mut st = self.lock_state();
        st.creation_queue.push_back(CreationRequest {
            name: name.to_string(),
            size_bytes,
            commands,
        });
        drop(st);
        self.cv.notify_all();
        debug!("queued creation request for '{name}' ({size_bytes} bytes)");
        Ok(())
    }

    /// Scheduler thread body.
    pub fn run_scheduler(&self) {
        debug!("scheduler thread started ({})", self.config);
        let mut rng = SmallRng::from_entropy();
        let mut st = self.lock_state();
        loop {
            st = self
                .cv
                .wait_while(st, |st| {
                    !self.stop.load(Ordering::Acquire)
                        && st.creation_queue.is_empty()
                        && st.blocked.is_empty()
                        && !(st.free_core().is_some() && !st.ready.is_empty())
                })
                .unwrap_or_else(PoisonError::into_inner);
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            // 1. Admit new processes.
            while let Some(request) = st.creation_queue.pop_front() {
                self.materialize(&mut st, request, &mut rng);
            }

            // 2. Service faults and unblock. The process is READY before its
            // fault is serviced, making it a legal victim for its own page-in.
            // Unblocked processes rejoin at the head: the retry must run while
            // the freshly loaded page is still resident, or two processes
            // sharing one frame evict each other forever without progress.
            // Quantum preemption still reinserts at the tail.
            while let Some(proc) = st.blocked.pop_front() {
                proc.set_state(ProcessState::Ready);
                if let Err(err) = self.mm.service_pending_fault(&proc) {
                    self.fatal(&err);
                }
                trace!("unblocked process {} ({})", proc.name, proc.pid);
                st.ready.push_front(proc);
            }

            // 3. Dispatch FIFO onto free cores.
            while let Some(core) = st.free_core() {
                let Some(proc) = st.ready.pop_front() else {
                    break;
                };
                proc.dispatch_to(core);
                self.metrics.record_dispatch();
                trace!("dispatched process {} ({}) to core {core}", proc.name, proc.pid);
                st.running[core] = Some(proc);
            }
        }
        debug!("scheduler thread exiting");
    }

    /// Turn a creation request into a READY process.
    fn materialize(&self, st: &mut SchedState, request: CreationRequest, rng: &mut SmallRng) {
        let pid = ProcessId(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let commands = request.commands.unwrap_or_else(|| {
            generator::synthesize_program(&request.name, request.size_bytes, &self.config, rng)
        });
        let proc = Arc::new(Process::new(pid, request.name, commands));

        if let Err(err) = self.mm.allocate(&proc, request.size_bytes) {
            match err {
                MemoryError::InvalidSize { .. } => {
                    // Submission validates sizes, so only a logic error lands here.
                    warn!("dropping process '{}': {err}", proc.name);
                    self.table.release(&proc.name);
                    return;
                }
                fatal => self.fatal(&fatal),
            }
        }

        info!(
            "admitted process {} ({}): {} bytes, {} instructions",
            proc.name,
            proc.pid,
            request.size_bytes,
            proc.commands.len()
        );
        self.table.bind(Arc::clone(&proc));
        proc.set_state(ProcessState::Ready);
        st.ready.push_back(proc);
        self.metrics.record_process_created();
    }

    /// Close intake, wait for every admitted process to finish, then stop all
    /// threads. Callers join the threads afterwards.
    pub fn shutdown(&self) {
        self.intake_open.store(false, Ordering::Release);
        self.maker_running.store(false, Ordering::Release);
        info!("shutdown requested; draining live processes");

        let st = self.lock_state();
        let st = self
            .cv
            .wait_while(st, |st| !st.is_quiescent())
            .unwrap_or_else(PoisonError::into_inner);
        drop(st);

        self.stop.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    pub fn start_maker(&self) {
        self.maker_running.store(true, Ordering::Release);
        info!("process generator enabled");
    }

    pub fn stop_maker(&self) {
        self.maker_running.store(false, Ordering::Release);
        info!("process generator disabled");
    }

    pub fn maker_running(&self) -> bool {
        self.maker_running.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Reporting view of queues and cores.
    pub fn snapshot(&self) -> SchedSnapshot {
        let st = self.lock_state();
        SchedSnapshot {
            running: st.running.clone(),
            ready_count: st.ready.len(),
            blocked_count: st.blocked.len(),
            finished: st.finished.clone(),
        }
    }

    /// Hold this guard while writing to the console from the core.
    pub fn console(&self) -> MutexGuard<'_, ()> {
        self.console.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unrecoverable memory-subsystem failure: diagnostic, nonzero exit.
    pub(super) fn fatal(&self, err: &MemoryError) -> ! {
        error!("fatal memory subsystem failure: {err}");
        {
            let _console = self.console();
            eprintln!("fatal: {err}");
        }
        std::process::exit(1);
    }
}
