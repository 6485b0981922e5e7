//! Batch process generation
//!
//! While the maker flag is on, a background thread submits a creation request
//! every `batch-process-freq` milliseconds with a generated name, a random
//! power-of-two size inside the configured range, and no program; the
//! scheduler synthesizes one at materialization. Turning the maker off leaves
//! already-queued requests untouched.

use std::{thread, time::Duration};

use log::{trace, warn};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    config::Config,
    error::{EmulatorError, SchedError},
    exec::{Instruction, Operand},
};

use super::Scheduler;

/// Poll granularity for maker/stop flags while sleeping.
const POLL_INTERVAL_MS: u64 = 50;

impl Scheduler {
    /// Generator thread body.
    pub fn run_generator(&self) {
        let mut rng = SmallRng::from_entropy();
        let mut sequence = 1u32;
        while !self.is_stopping() {
            if !self.maker_running() {
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                continue;
            }

            let name = format!("p{sequence:02}");
            sequence += 1;
            let size = random_proc_size(&self.config, &mut rng);
            match self.submit(&name, size, None) {
                Ok(()) => trace!("generator queued '{name}' ({size} bytes)"),
                // A user took this name with screen -s; move on to the next.
                Err(EmulatorError::Sched(SchedError::DuplicateName { .. })) => continue,
                Err(EmulatorError::Sched(SchedError::ShuttingDown)) => break,
                Err(err) => warn!("generator submission failed: {err}"),
            }
            self.sleep_while_making(self.config.batch_process_freq);
        }
        trace!("generator thread exiting");
    }

    /// Sleep `ms`, waking early if the maker is turned off or stop is raised.
    fn sleep_while_making(&self, ms: u64) {
        let mut remaining = ms;
        while remaining > 0 && self.maker_running() && !self.is_stopping() {
            let chunk = remaining.min(POLL_INTERVAL_MS);
            thread::sleep(Duration::from_millis(chunk));
            remaining -= chunk;
        }
    }
}

/// Random power-of-two size in `[min-mem-per-proc, max-mem-per-proc]`.
pub(super) fn random_proc_size(config: &Config, rng: &mut SmallRng) -> usize {
    let min_exp = config.min_mem_per_proc.trailing_zeros();
    let max_exp = config.max_mem_per_proc.trailing_zeros();
    1usize << rng.gen_range(min_exp..=max_exp)
}

/// Synthesize a program of `[min-ins, max-ins]` instructions mixing
/// arithmetic, PRINT, SLEEP, and word-aligned WRITE/READ pairs confined to
/// the process's allocation, so generated load exercises the paging path.
pub(super) fn synthesize_program(
    name: &str,
    size_bytes: usize,
    config: &Config,
    rng: &mut SmallRng,
) -> Vec<Instruction> {
    const VARS: [&str; 3] = ["x", "y", "z"];
    let length = rng.gen_range(config.min_ins..=config.max_ins);
    let mut instructions = Vec::with_capacity(length);

    let var = |rng: &mut SmallRng| VARS[rng.gen_range(0..VARS.len())].to_string();
    // Word-aligned so the two bytes never cross the allocation end.
    let address = |rng: &mut SmallRng| rng.gen_range(0..size_bytes / 2) * 2;

    for _ in 0..length {
        let instruction = match rng.gen_range(0..8u8) {
            0 => Instruction::Print {
                literal: format!("Hello world from {name}!"),
                variable: None,
            },
            1 => Instruction::Declare {
                name: var(rng),
                value: rng.gen_range(0..=100),
            },
            2 | 3 => Instruction::Add {
                dest: var(rng),
                lhs: Operand(var(rng)),
                rhs: Operand(rng.gen_range(1..=10u16).to_string()),
            },
            4 => Instruction::Subtract {
                dest: var(rng),
                lhs: Operand(var(rng)),
                rhs: Operand(rng.gen_range(1..=10u16).to_string()),
            },
            5 => Instruction::Sleep {
                ticks: rng.gen_range(1..=8),
            },
            6 => Instruction::Write {
                address: address(rng),
                value: Operand(rng.gen_range(0..=500u16).to_string()),
            },
            _ => Instruction::Read {
                dest: var(rng),
                address: address(rng),
            },
        };
        instructions.push(instruction);
    }
    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SchedPolicy;

    fn config() -> Config {
        Config {
            num_cpu: 1,
            scheduler: SchedPolicy::RoundRobin,
            quantum_cycles: 4,
            batch_process_freq: 100,
            min_ins: 5,
            max_ins: 10,
            delay_per_exec: 0,
            max_overall_mem: 256,
            mem_per_frame: 64,
            min_mem_per_proc: 64,
            max_mem_per_proc: 256,
        }
    }

    #[test]
    fn generated_sizes_are_powers_of_two_in_range() {
        let config = config();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let size = random_proc_size(&config, &mut rng);
            assert!(size.is_power_of_two());
            assert!((64..=256).contains(&size));
        }
    }

    #[test]
    fn generated_programs_respect_length_and_bounds() {
        let config = config();
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            let program = synthesize_program("p01", 128, &config, &mut rng);
            assert!((5..=10).contains(&program.len()));
            for instruction in &program {
                match instruction {
                    Instruction::Write { address, .. } | Instruction::Read { address, .. } => {
                        assert!(address + 1 < 128);
                        assert_eq!(address % 2, 0);
                    }
                    _ => {}
                }
            }
        }
    }
}
