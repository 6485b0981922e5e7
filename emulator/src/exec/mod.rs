//! The process instruction language
//!
//! Processes run a tiny command set: arithmetic over a 16-bit symbol table,
//! PRINT logging, SLEEP, and the WRITE/READ pair that drives the memory
//! subsystem. Commands arrive as strings (`screen -c`, generated programs),
//! are parsed once into [`Instruction`] values, and are interpreted by the
//! executor one at a time.

mod executor;
mod parser;

pub use executor::{execute, ExecOutcome};
pub use parser::{parse_command, parse_program, parse_user_program, MAX_USER_COMMANDS};

use std::collections::BTreeMap;

/// An operand token, resolved against the symbol table at execution time:
/// a defined variable wins, otherwise the token parses as decimal, otherwise
/// the value is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand(pub String);

impl Operand {
    pub fn resolve(&self, variables: &BTreeMap<String, u16>) -> u16 {
        if let Some(&value) = variables.get(&self.0) {
            return value;
        }
        self.0.parse().unwrap_or(0)
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `PRINT("literal")` or `PRINT("literal" + var)`
    Print {
        literal: String,
        variable: Option<String>,
    },
    /// `DECLARE name value`
    Declare { name: String, value: u16 },
    /// `ADD dest a b`
    Add {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// `SUBTRACT dest a b`
    Subtract {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// `SLEEP n`
    Sleep { ticks: u64 },
    /// `WRITE 0xADDR src`
    Write { address: usize, value: Operand },
    /// `READ dest 0xADDR`
    Read { dest: String, address: usize },
}

impl core::fmt::Display for Instruction {
    /// Canonical textual form; parsing the rendering yields the same
    /// instruction (FOR bodies are already flattened away).
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Instruction::Print { literal, variable } => match variable {
                Some(var) => write!(f, "PRINT(\"{literal}\" + {var})"),
                None => write!(f, "PRINT(\"{literal}\")"),
            },
            Instruction::Declare { name, value } => write!(f, "DECLARE {name} {value}"),
            Instruction::Add { dest, lhs, rhs } => write!(f, "ADD {dest} {lhs} {rhs}"),
            Instruction::Subtract { dest, lhs, rhs } => {
                write!(f, "SUBTRACT {dest} {lhs} {rhs}")
            }
            Instruction::Sleep { ticks } => write!(f, "SLEEP {ticks}"),
            Instruction::Write { address, value } => write!(f, "WRITE 0x{address:x} {value}"),
            Instruction::Read { dest, address } => write!(f, "READ {dest} 0x{address:x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_round_trips_through_the_parser() {
        let program = r#"DECLARE x 7; ADD x x 1; SUBTRACT y x 2; PRINT("x=" + x); PRINT("hi"); SLEEP 3; WRITE 0x40 x; READ y 0x40"#;
        let parsed = parse_program(program).unwrap();
        for instruction in &parsed {
            let reparsed = parse_command(&instruction.to_string()).unwrap();
            assert_eq!(reparsed.as_slice(), std::slice::from_ref(instruction));
        }
    }

    #[test]
    fn operand_prefers_variables_over_literals() {
        let mut vars = BTreeMap::new();
        vars.insert("x".to_string(), 9);
        assert_eq!(Operand("x".into()).resolve(&vars), 9);
        assert_eq!(Operand("42".into()).resolve(&vars), 42);
        assert_eq!(Operand("missing".into()).resolve(&vars), 0);
    }
}
