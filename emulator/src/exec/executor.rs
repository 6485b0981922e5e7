//! Instruction interpreter
//!
//! Executes exactly one instruction against a PCB. Non-memory instructions
//! always advance; WRITE/READ consult the memory manager and surface its
//! outcome so the worker can block or terminate the process. The program
//! counter is owned by the worker and is not touched here.

use crate::{
    mm::{MemAccess, MemoryManager},
    process::Process,
};

use super::Instruction;

/// What one instruction did to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ExecOutcome {
    /// Instruction completed; advance the program counter.
    Advanced,
    /// Page fault; do not advance, park the process until service.
    Blocked,
    /// Segmentation fault; the PCB carries the violation record.
    Terminated,
}

/// Execute `instruction` on behalf of `proc`.
pub fn execute(proc: &Process, instruction: &Instruction, mm: &MemoryManager) -> ExecOutcome {
    match instruction {
        Instruction::Print { literal, variable } => {
            let line = match variable {
                Some(name) => {
                    let value = proc.variables.lock().get(name).copied().unwrap_or(0);
                    format!("{literal}{value}")
                }
                None => literal.clone(),
            };
            proc.append_output(line);
            ExecOutcome::Advanced
        }
        Instruction::Declare { name, value } => {
            proc.variables.lock().insert(name.clone(), *value);
            ExecOutcome::Advanced
        }
        Instruction::Add { dest, lhs, rhs } => {
            let mut vars = proc.variables.lock();
            let value = lhs.resolve(&vars).wrapping_add(rhs.resolve(&vars));
            vars.insert(dest.clone(), value);
            ExecOutcome::Advanced
        }
        Instruction::Subtract { dest, lhs, rhs } => {
            let mut vars = proc.variables.lock();
            let value = lhs.resolve(&vars).wrapping_sub(rhs.resolve(&vars));
            vars.insert(dest.clone(), value);
            ExecOutcome::Advanced
        }
        Instruction::Sleep { ticks } => {
            proc.record_sleep(*ticks);
            ExecOutcome::Advanced
        }
        Instruction::Write { address, value } => {
            let word = value.resolve(&proc.variables.lock());
            match mm.write_word(proc, *address, word) {
                MemAccess::Ok(()) => ExecOutcome::Advanced,
                MemAccess::PageFault => ExecOutcome::Blocked,
                MemAccess::SegFault => ExecOutcome::Terminated,
            }
        }
        Instruction::Read { dest, address } => match mm.read_word(proc, *address) {
            MemAccess::Ok(word) => {
                proc.variables.lock().insert(dest.clone(), word);
                ExecOutcome::Advanced
            }
            MemAccess::PageFault => ExecOutcome::Blocked,
            MemAccess::SegFault => ExecOutcome::Terminated,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        exec::parse_program,
        process::{ProcessId, ProcessState, ProcessTable},
    };

    fn fixture(tag: &str) -> (Arc<Process>, MemoryManager) {
        let table = Arc::new(ProcessTable::new());
        let path = std::env::temp_dir().join(format!(
            "csopesy-exec-test-{tag}-{}.bin",
            std::process::id()
        ));
        let mm = MemoryManager::new(256, 64, &path, Arc::clone(&table)).unwrap();
        let proc = Arc::new(Process::new(ProcessId(1), "p01".into(), Vec::new()));
        proc.set_state(ProcessState::Ready);
        table.reserve("p01").unwrap();
        table.bind(Arc::clone(&proc));
        mm.allocate(&proc, 128).unwrap();
        (proc, mm)
    }

    fn run_to_completion(proc: &Process, program: &str, mm: &MemoryManager) {
        for instruction in parse_program(program).unwrap() {
            loop {
                match execute(proc, &instruction, mm) {
                    ExecOutcome::Advanced => break,
                    ExecOutcome::Blocked => {
                        mm.service_pending_fault(proc).unwrap();
                    }
                    ExecOutcome::Terminated => panic!("unexpected segfault"),
                }
            }
        }
    }

    #[test]
    fn arithmetic_is_modular_16_bit() {
        let (proc, mm) = fixture("arith");
        run_to_completion(
            &proc,
            "DECLARE x 65535; ADD x x 1; DECLARE y 0; SUBTRACT y y 1",
            &mm,
        );
        let vars = proc.variables.lock();
        assert_eq!(vars.get("x"), Some(&0));
        assert_eq!(vars.get("y"), Some(&65535));
    }

    #[test]
    fn print_appends_literal_and_variable() {
        let (proc, mm) = fixture("print");
        run_to_completion(
            &proc,
            r#"DECLARE x 7; ADD x x x; PRINT("x=" + x); PRINT("done")"#,
            &mm,
        );
        let logs = proc.output_logs.lock();
        assert_eq!(logs.as_slice(), ["x=14", "done"]);
    }

    #[test]
    fn undefined_print_variable_reads_zero() {
        let (proc, mm) = fixture("printzero");
        run_to_completion(&proc, r#"PRINT("v=" + nope)"#, &mm);
        assert_eq!(proc.output_logs.lock().as_slice(), ["v=0"]);
    }

    #[test]
    fn write_then_read_round_trips_via_memory() {
        let (proc, mm) = fixture("memrw");
        run_to_completion(&proc, r#"WRITE 0x10 311; READ a 0x10; PRINT("a=" + a)"#, &mm);
        assert_eq!(proc.output_logs.lock().as_slice(), ["a=311"]);
    }

    #[test]
    fn first_memory_touch_blocks_without_advancing() {
        let (proc, mm) = fixture("block");
        let instruction = parse_program("WRITE 0x0 5").unwrap().remove(0);
        assert_eq!(execute(&proc, &instruction, &mm), ExecOutcome::Blocked);
        assert_eq!(proc.program_counter(), 0);
        mm.service_pending_fault(&proc).unwrap();
        assert_eq!(execute(&proc, &instruction, &mm), ExecOutcome::Advanced);
    }

    #[test]
    fn out_of_bounds_read_terminates() {
        let (proc, mm) = fixture("oob");
        let instruction = parse_program("READ x 0xFFFF").unwrap().remove(0);
        assert_eq!(execute(&proc, &instruction, &mm), ExecOutcome::Terminated);
        assert!(proc.mem.lock().violation.is_some());
    }

    #[test]
    fn sleep_accumulates_ticks_and_advances() {
        let (proc, mm) = fixture("sleep");
        run_to_completion(&proc, "SLEEP 4; SLEEP 6", &mm);
        assert_eq!(proc.sleep_ticks(), 10);
    }
}
