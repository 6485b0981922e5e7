//! Emulator configuration
//!
//! Parses the `config.txt` key/value format (whitespace-separated, values
//! optionally double-quoted) and validates every constraint up front, so the
//! rest of the system can assume a well-formed configuration. Immutable after
//! `initialize`.

use std::{fmt, path::Path, str::FromStr};

use crate::{error::ConfigError, sched::SchedPolicy};

/// Largest supported virtual core count.
pub const MAX_CPU_COUNT: usize = 128;

/// Validated emulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Virtual core count `C`, 1..=128.
    pub num_cpu: usize,
    /// Scheduling policy.
    pub scheduler: SchedPolicy,
    /// Round-robin quantum in instructions.
    pub quantum_cycles: u32,
    /// Process-generation period in milliseconds.
    pub batch_process_freq: u64,
    /// Bounds on generated program length.
    pub min_ins: usize,
    pub max_ins: usize,
    /// Delay after each executed instruction, milliseconds.
    pub delay_per_exec: u64,
    /// Physical memory size in bytes.
    pub max_overall_mem: usize,
    /// Frame (and page) size in bytes.
    pub mem_per_frame: usize,
    /// Bounds on generated per-process allocations.
    pub min_mem_per_proc: usize,
    pub max_mem_per_proc: usize,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse the key/value format and validate the result.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut num_cpu = None;
        let mut scheduler = None;
        let mut quantum_cycles = None;
        let mut batch_process_freq = None;
        let mut min_ins = None;
        let mut max_ins = None;
        let mut delay_per_exec = None;
        let mut max_overall_mem = None;
        let mut mem_per_frame = None;
        let mut min_mem_per_proc = None;
        let mut max_mem_per_proc = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k.trim(), unquote(v.trim())),
                None => continue,
            };
            match key {
                "num-cpu" => num_cpu = Some(parse_num("num-cpu", value)?),
                "scheduler" => {
                    scheduler = Some(SchedPolicy::from_str(value).map_err(|_| {
                        ConfigError::InvalidValue {
                            key: "scheduler",
                            value: value.to_string(),
                            reason: "expected \"fcfs\" or \"rr\"",
                        }
                    })?)
                }
                "quantum-cycles" => quantum_cycles = Some(parse_num("quantum-cycles", value)?),
                "batch-process-freq" => {
                    batch_process_freq = Some(parse_num("batch-process-freq", value)?)
                }
                "min-ins" => min_ins = Some(parse_num("min-ins", value)?),
                "max-ins" => max_ins = Some(parse_num("max-ins", value)?),
                "delay-per-exec" => delay_per_exec = Some(parse_num("delay-per-exec", value)?),
                "max-overall-mem" => max_overall_mem = Some(parse_num("max-overall-mem", value)?),
                "mem-per-frame" => mem_per_frame = Some(parse_num("mem-per-frame", value)?),
                "min-mem-per-proc" => {
                    min_mem_per_proc = Some(parse_num("min-mem-per-proc", value)?)
                }
                "max-mem-per-proc" => {
                    max_mem_per_proc = Some(parse_num("max-mem-per-proc", value)?)
                }
                _ => log::warn!("ignoring unknown configuration key '{key}'"),
            }
        }

        let config = Config {
            num_cpu: require(num_cpu, "num-cpu")?,
            scheduler: require(scheduler, "scheduler")?,
            quantum_cycles: require(quantum_cycles, "quantum-cycles")?,
            batch_process_freq: require(batch_process_freq, "batch-process-freq")?,
            min_ins: require(min_ins, "min-ins")?,
            max_ins: require(max_ins, "max-ins")?,
            delay_per_exec: require(delay_per_exec, "delay-per-exec")?,
            max_overall_mem: require(max_overall_mem, "max-overall-mem")?,
            mem_per_frame: require(mem_per_frame, "mem-per-frame")?,
            min_mem_per_proc: require(min_mem_per_proc, "min-mem-per-proc")?,
            max_mem_per_proc: require(max_mem_per_proc, "max-mem-per-proc")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |ok: bool, key: &'static str, value: usize, reason: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                    reason,
                })
            }
        };

        check(
            (1..=MAX_CPU_COUNT).contains(&self.num_cpu),
            "num-cpu",
            self.num_cpu,
            "must be in 1..=128",
        )?;
        check(
            self.quantum_cycles >= 1,
            "quantum-cycles",
            self.quantum_cycles as usize,
            "must be at least 1",
        )?;
        check(self.min_ins >= 1, "min-ins", self.min_ins, "must be at least 1")?;
        check(
            self.min_ins <= self.max_ins,
            "max-ins",
            self.max_ins,
            "must be >= min-ins",
        )?;
        check(
            self.max_overall_mem.is_power_of_two(),
            "max-overall-mem",
            self.max_overall_mem,
            "must be a power of two",
        )?;
        check(
            self.mem_per_frame.is_power_of_two(),
            "mem-per-frame",
            self.mem_per_frame,
            "must be a power of two",
        )?;
        check(
            self.mem_per_frame <= self.max_overall_mem,
            "mem-per-frame",
            self.mem_per_frame,
            "must not exceed max-overall-mem",
        )?;
        for (key, value) in [
            ("min-mem-per-proc", self.min_mem_per_proc),
            ("max-mem-per-proc", self.max_mem_per_proc),
        ] {
            check(
                value.is_power_of_two() && (crate::mm::MIN_PROC_MEM..=crate::mm::MAX_PROC_MEM).contains(&value),
                key,
                value,
                "must be a power of two in [64, 65536]",
            )?;
        }
        check(
            self.min_mem_per_proc <= self.max_mem_per_proc,
            "max-mem-per-proc",
            self.max_mem_per_proc,
            "must be >= min-mem-per-proc",
        )?;
        Ok(())
    }

    /// Number of physical frames `F = M_total / M_frame`.
    pub fn frame_count(&self) -> usize {
        self.max_overall_mem / self.mem_per_frame
    }

    /// Instruction quantum as enforced by workers. FCFS never preempts, which
    /// is round-robin with an unbounded quantum.
    pub fn effective_quantum(&self) -> u64 {
        match self.scheduler {
            SchedPolicy::Fcfs => u64::MAX,
            SchedPolicy::RoundRobin => u64::from(self.quantum_cycles),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores, {} scheduler (quantum {}), mem {}/{} bytes, proc {}..{} bytes",
            self.num_cpu,
            self.scheduler,
            self.quantum_cycles,
            self.max_overall_mem,
            self.mem_per_frame,
            self.min_mem_per_proc,
            self.max_mem_per_proc,
        )
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn require<T>(value: Option<T>, key: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingKey { key })
}

fn parse_num<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"num-cpu 4
scheduler "rr"
quantum-cycles 5
batch-process-freq 1
min-ins 1000
max-ins 2000
delay-per-exec 0
max-overall-mem 16384
mem-per-frame 16
min-mem-per-proc 4096
max-mem-per-proc 4096
"#;

    #[test]
    fn parses_sample_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.num_cpu, 4);
        assert_eq!(config.scheduler, SchedPolicy::RoundRobin);
        assert_eq!(config.quantum_cycles, 5);
        assert_eq!(config.frame_count(), 1024);
        assert_eq!(config.effective_quantum(), 5);
    }

    #[test]
    fn fcfs_quantum_is_unbounded() {
        let text = SAMPLE.replace("\"rr\"", "\"fcfs\"");
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.effective_quantum(), u64::MAX);
    }

    #[test]
    fn rejects_missing_key() {
        let text = SAMPLE.replace("num-cpu 4\n", "");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::MissingKey { key: "num-cpu" })
        ));
    }

    #[test]
    fn rejects_non_power_of_two_memory() {
        let text = SAMPLE.replace("max-overall-mem 16384", "max-overall-mem 10000");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::InvalidValue { key: "max-overall-mem", .. })
        ));
    }

    #[test]
    fn rejects_oversized_cpu_count() {
        let text = SAMPLE.replace("num-cpu 4", "num-cpu 129");
        assert!(Config::parse(&text).is_err());
    }

    #[test]
    fn rejects_process_memory_outside_bounds() {
        let text = SAMPLE.replace("min-mem-per-proc 4096", "min-mem-per-proc 32");
        assert!(Config::parse(&text).is_err());
    }
}
