//! The system aggregate
//!
//! Built once by `initialize`: configuration, process directory, memory
//! manager, scheduler, and the threads that animate them. Every shell query
//! goes through here and returns rendered text; the shell itself only prints.

use std::{
    fmt::Write as _,
    fs::OpenOptions,
    io::{self, Write as _},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::{
    config::Config,
    error::EmulatorError,
    exec::Instruction,
    mm::MemoryManager,
    process::{ProcessState, ProcessTable},
    sched::{CpuMetrics, Scheduler},
};

/// Backing-store file created in the working directory at `initialize`.
pub const BACKING_STORE_FILE: &str = "csopesy-backing-store.bin";
/// Destination of `report-util`.
pub const REPORT_FILE: &str = "csopesy-log.txt";

const HR: &str = "-------------------------------------------------------------";

/// The running emulator.
pub struct System {
    config: Arc<Config>,
    table: Arc<ProcessTable>,
    mm: Arc<MemoryManager>,
    sched: Arc<Scheduler>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl System {
    /// Construct everything and start the scheduler, worker, and generator
    /// threads, with the backing store at its default path.
    pub fn initialize(config: Config) -> Result<Arc<Self>, EmulatorError> {
        Self::initialize_with_store(config, Path::new(BACKING_STORE_FILE))
    }

    /// As [`System::initialize`], with an explicit backing-store path.
    pub fn initialize_with_store(
        config: Config,
        store_path: &Path,
    ) -> Result<Arc<Self>, EmulatorError> {
        config.validate()?;
        let config = Arc::new(config);
        let table = Arc::new(ProcessTable::new());
        let mm = Arc::new(MemoryManager::new(
            config.max_overall_mem,
            config.mem_per_frame,
            store_path,
            Arc::clone(&table),
        )?);
        let sched = Arc::new(Scheduler::new(
            Arc::clone(&config),
            Arc::clone(&mm),
            Arc::clone(&table),
        ));

        let mut threads = Vec::with_capacity(config.num_cpu + 2);
        {
            let sched = Arc::clone(&sched);
            threads.push(
                thread::Builder::new()
                    .name("scheduler".into())
                    .spawn(move || sched.run_scheduler())?,
            );
        }
        for core in 0..config.num_cpu {
            let sched = Arc::clone(&sched);
            threads.push(
                thread::Builder::new()
                    .name(format!("cpu-{core}"))
                    .spawn(move || sched.run_worker(core))?,
            );
        }
        {
            let sched = Arc::clone(&sched);
            threads.push(
                thread::Builder::new()
                    .name("process-maker".into())
                    .spawn(move || sched.run_generator())?,
            );
        }

        info!("system initialized: {config}");
        Ok(Arc::new(Self {
            config,
            table,
            mm,
            sched,
            threads: Mutex::new(threads),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.mm
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.table
    }

    pub fn metrics(&self) -> &CpuMetrics {
        &self.sched.metrics
    }

    /// Queue a process creation (`screen -s` / `screen -c`).
    pub fn submit_process(
        &self,
        name: &str,
        size_bytes: usize,
        commands: Option<Vec<Instruction>>,
    ) -> Result<(), EmulatorError> {
        self.sched.submit(name, size_bytes, commands)
    }

    pub fn start_generator(&self) {
        self.sched.start_maker();
    }

    pub fn stop_generator(&self) {
        self.sched.stop_maker();
    }

    /// Drain all live work, stop every thread, and join them.
    pub fn shutdown(&self) {
        self.sched.shutdown();
        let threads = {
            let mut guard = self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in threads {
            let name = handle.thread().name().unwrap_or("?").to_string();
            if handle.join().is_err() {
                warn!("thread '{name}' panicked before join");
            }
        }
        info!("system shut down");
    }

    /// `screen -ls` rendering.
    pub fn screen_list(&self) -> String {
        let snap = self.sched.snapshot();
        let mut out = String::new();
        out.push_str(HR);
        out.push('\n');
        out.push_str(&format!("CPU Utilization: {}%\n", snap.cpu_utilization()));
        out.push_str(&format!(
            "Ready: {}    Blocked: {}\n",
            snap.ready_count, snap.blocked_count
        ));

        out.push_str("\nRunning processes:\n");
        for proc in snap.running.iter().flatten() {
            let core = proc
                .assigned_core()
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            out.push_str(&format!(
                "{} ({})\tCore: {}\t{} / {}\n",
                proc.name,
                format_timestamp(proc.start_time),
                core,
                proc.program_counter(),
                proc.commands.len()
            ));
        }

        out.push_str("\nFinished processes:\n");
        for proc in &snap.finished {
            let label = match proc.state() {
                ProcessState::Terminated => "Terminated",
                _ => "Finished",
            };
            let stamp = proc.finish_time().unwrap_or(proc.start_time);
            out.push_str(&format!(
                "{} ({})\t{}\t{} / {}\n",
                proc.name,
                format_timestamp(stamp),
                label,
                proc.program_counter(),
                proc.commands.len()
            ));
        }
        out.push_str(HR);
        out.push('\n');
        out
    }

    /// `screen -r NAME` rendering; `None` when the name is unknown.
    pub fn process_report(&self, name: &str) -> Option<String> {
        let proc = self.table.get(name)?;
        if proc.state() == ProcessState::Terminated {
            if let Some(diagnostic) = proc.violation_diagnostic() {
                return Some(diagnostic);
            }
        }

        let mut out = String::new();
        let _ = writeln!(out, "Process: {}", proc.name);
        let _ = writeln!(out, "ID: {}", proc.pid);
        match (proc.state(), proc.assigned_core()) {
            (ProcessState::Running, Some(core)) => {
                let _ = writeln!(out, "State: RUNNING (Core: {core})");
            }
            (state, _) => {
                let _ = writeln!(out, "State: {state}");
            }
        }
        let _ = writeln!(
            out,
            "Instruction: {} / {}",
            proc.program_counter(),
            proc.commands.len()
        );
        let logs = proc.output_logs.lock();
        if !logs.is_empty() {
            let _ = writeln!(out, "Logs:");
            for line in logs.iter() {
                let _ = writeln!(out, "{line}");
            }
        }
        Some(out)
    }

    /// `vmstat` rendering.
    pub fn vmstat_report(&self) -> String {
        let metrics = self.metrics();
        let stats = self.mm.stats();
        let mut out = String::new();
        let _ = writeln!(out, "Total memory     : {} bytes", self.mm.total_bytes());
        let _ = writeln!(out, "Used memory      : {} bytes", self.mm.used_bytes());
        let _ = writeln!(out, "Free memory      : {} bytes", self.mm.free_bytes());
        let _ = writeln!(out, "Idle CPU ticks   : {}", metrics.idle_ticks());
        let _ = writeln!(out, "Active CPU ticks : {}", metrics.active_ticks());
        let _ = writeln!(out, "Total CPU ticks  : {}", metrics.total_ticks());
        let _ = writeln!(out, "Num paged in     : {}", stats.pages_paged_in());
        let _ = writeln!(out, "Num paged out    : {}", stats.pages_paged_out());
        out
    }

    /// `process-smi` rendering.
    pub fn smi_report(&self) -> String {
        let snap = self.sched.snapshot();
        let used = self.mm.used_bytes();
        let total = self.mm.total_bytes();
        let mem_util = if total > 0 { used * 100 / total } else { 0 };

        let mut out = String::new();
        out.push_str(HR);
        out.push('\n');
        out.push_str("| PROCESS-SMI V01.00  Driver Version: 01.00 |\n\n");
        let _ = writeln!(out, "CPU-Util: {}%", snap.cpu_utilization());
        let _ = writeln!(
            out,
            "Memory Usage: {} / {}",
            format_memory(used),
            format_memory(total)
        );
        let _ = writeln!(out, "Memory Util: {mem_util}%");
        out.push_str("\nRunning Processes and Memory Usage:\n");
        out.push_str(HR);
        out.push('\n');
        for proc in snap.running.iter().flatten() {
            let size = proc.mem.lock().size_bytes;
            let _ = writeln!(out, "{:<12}{}", proc.name, format_memory(size));
        }
        out.push_str(HR);
        out.push('\n');
        out
    }

    /// `report-util`: append the `screen -ls` rendering to `path`.
    pub fn append_report(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.screen_list().as_bytes())?;
        file.flush()
    }
}

fn format_timestamp(stamp: DateTime<Local>) -> String {
    stamp.format("%m/%d/%Y %I:%M:%S%p").to_string()
}

/// Human-readable byte count, matching the original report layout.
fn format_memory(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{bytes}B")
    } else if bytes_f < MIB {
        format!("{:.1}KiB", bytes_f / KIB)
    } else if bytes_f < GIB {
        format!("{:.1}MiB", bytes_f / MIB)
    } else {
        format!("{:.1}GiB", bytes_f / GIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_formatting_scales_units() {
        assert_eq!(format_memory(256), "256B");
        assert_eq!(format_memory(2048), "2.0KiB");
        assert_eq!(format_memory(3 * 1024 * 1024), "3.0MiB");
    }
}
