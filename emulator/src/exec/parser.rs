//! Mini-language parser
//!
//! Command tokens are case-insensitive; variable names are not. Programs are
//! `;`-separated command lists; FOR bodies are flattened here so the executor
//! only ever sees straight-line instructions.

use crate::error::{EmulatorError, ParseError, SchedError};

use super::{Instruction, Operand};

/// Maximum FOR nesting depth.
const MAX_FOR_DEPTH: usize = 3;

/// Command limit for user-submitted programs, counted before FOR flattening.
pub const MAX_USER_COMMANDS: usize = 50;

/// Parse a `screen -c` program: enforces the 1..=50 command limit, then
/// parses and flattens.
pub fn parse_user_program(source: &str) -> Result<Vec<Instruction>, EmulatorError> {
    let commands = split_commands(source)?;
    if commands.is_empty() || commands.len() > MAX_USER_COMMANDS {
        return Err(SchedError::ProgramTooLarge {
            count: commands.len(),
        }
        .into());
    }
    let mut instructions = Vec::new();
    for command in commands {
        instructions.extend(parse_command(&command)?);
    }
    Ok(instructions)
}

/// Parse a `;`-separated program into a flattened instruction list.
pub fn parse_program(source: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut instructions = Vec::new();
    for command in split_commands(source)? {
        instructions.extend(parse_command(&command)?);
    }
    if instructions.is_empty() {
        return Err(ParseError::EmptyProgram);
    }
    Ok(instructions)
}

/// Parse one command. FOR expands into its flattened body, so a single
/// command can yield many instructions.
pub fn parse_command(command: &str) -> Result<Vec<Instruction>, ParseError> {
    parse_with_depth(command, 0)
}

fn parse_with_depth(command: &str, depth: usize) -> Result<Vec<Instruction>, ParseError> {
    let command = command.trim();
    let keyword = command
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    match keyword.as_str() {
        "PRINT" => parse_print(command).map(|i| vec![i]),
        "DECLARE" => parse_declare(command).map(|i| vec![i]),
        "ADD" => parse_arith(command, true).map(|i| vec![i]),
        "SUBTRACT" => parse_arith(command, false).map(|i| vec![i]),
        "SLEEP" => parse_sleep(command).map(|i| vec![i]),
        "WRITE" => parse_write(command).map(|i| vec![i]),
        "READ" => parse_read(command).map(|i| vec![i]),
        "FOR" => parse_for(command, depth),
        _ => Err(ParseError::UnknownCommand {
            token: command.split_whitespace().next().unwrap_or("").to_string(),
        }),
    }
}

/// Split a program on top-level `;`, honoring quotes and FOR braces.
fn split_commands(source: &str) -> Result<Vec<String>, ParseError> {
    let mut commands = Vec::new();
    let mut current = String::new();
    let mut brace_depth = 0usize;
    let mut in_quotes = false;

    for c in source.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '{' if !in_quotes => {
                brace_depth += 1;
                current.push(c);
            }
            '}' if !in_quotes => {
                brace_depth = brace_depth
                    .checked_sub(1)
                    .ok_or(ParseError::UnbalancedBraces)?;
                current.push(c);
            }
            ';' if !in_quotes && brace_depth == 0 => {
                if !current.trim().is_empty() {
                    commands.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if brace_depth != 0 {
        return Err(ParseError::UnbalancedBraces);
    }
    if !current.trim().is_empty() {
        commands.push(current.trim().to_string());
    }
    Ok(commands)
}

/// `PRINT("literal")` | `PRINT("literal" + var)`
fn parse_print(command: &str) -> Result<Instruction, ParseError> {
    let malformed = |detail| ParseError::MalformedCommand {
        command: "PRINT",
        detail,
    };

    let rest = command[5..].trim(); // past the PRINT keyword
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or(malformed("expected parenthesized argument"))?
        .trim();

    let after_quote = inner
        .strip_prefix('"')
        .ok_or(malformed("expected a quoted literal"))?;
    let close = after_quote
        .find('"')
        .ok_or(malformed("unterminated string literal"))?;
    let literal = after_quote[..close].to_string();
    let tail = after_quote[close + 1..].trim();

    let variable = if tail.is_empty() {
        None
    } else {
        let var = tail
            .strip_prefix('+')
            .ok_or(malformed("expected '+ var' after the literal"))?
            .trim();
        if var.is_empty() || var.contains(char::is_whitespace) {
            return Err(malformed("expected a single variable name after '+'"));
        }
        Some(var.to_string())
    };

    Ok(Instruction::Print { literal, variable })
}

/// `DECLARE name value`
fn parse_declare(command: &str) -> Result<Instruction, ParseError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let [_, name, value] = tokens.as_slice() else {
        return Err(ParseError::MalformedCommand {
            command: "DECLARE",
            detail: "expected 'DECLARE name value'",
        });
    };
    // Declared values are truncated to 16 bits, matching the executor's
    // modular arithmetic.
    let value: u64 = value.parse().map_err(|_| ParseError::BadValue {
        token: value.to_string(),
    })?;
    Ok(Instruction::Declare {
        name: name.to_string(),
        value: (value & 0xFFFF) as u16,
    })
}

/// `ADD dest a b` | `SUBTRACT dest a b`
fn parse_arith(command: &str, is_add: bool) -> Result<Instruction, ParseError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let [_, dest, a, b] = tokens.as_slice() else {
        return Err(ParseError::MalformedCommand {
            command: if is_add { "ADD" } else { "SUBTRACT" },
            detail: "expected 'dest a b'",
        });
    };
    let dest = dest.to_string();
    let lhs = Operand(a.to_string());
    let rhs = Operand(b.to_string());
    Ok(if is_add {
        Instruction::Add { dest, lhs, rhs }
    } else {
        Instruction::Subtract { dest, lhs, rhs }
    })
}

/// `SLEEP n`
fn parse_sleep(command: &str) -> Result<Instruction, ParseError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let [_, ticks] = tokens.as_slice() else {
        return Err(ParseError::MalformedCommand {
            command: "SLEEP",
            detail: "expected 'SLEEP n'",
        });
    };
    let ticks = ticks.parse().map_err(|_| ParseError::BadValue {
        token: ticks.to_string(),
    })?;
    Ok(Instruction::Sleep { ticks })
}

/// `WRITE 0xADDR src`
fn parse_write(command: &str) -> Result<Instruction, ParseError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let [_, address, value] = tokens.as_slice() else {
        return Err(ParseError::MalformedCommand {
            command: "WRITE",
            detail: "expected 'WRITE 0xADDR src'",
        });
    };
    Ok(Instruction::Write {
        address: parse_address(address)?,
        value: Operand(value.to_string()),
    })
}

/// `READ dest 0xADDR`
fn parse_read(command: &str) -> Result<Instruction, ParseError> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let [_, dest, address] = tokens.as_slice() else {
        return Err(ParseError::MalformedCommand {
            command: "READ",
            detail: "expected 'READ dest 0xADDR'",
        });
    };
    Ok(Instruction::Read {
        dest: dest.to_string(),
        address: parse_address(address)?,
    })
}

/// `FOR k { body }`
fn parse_for(command: &str, depth: usize) -> Result<Vec<Instruction>, ParseError> {
    if depth >= MAX_FOR_DEPTH {
        return Err(ParseError::NestingTooDeep);
    }
    let malformed = |detail| ParseError::MalformedCommand {
        command: "FOR",
        detail,
    };

    let rest = command[3..].trim(); // past the FOR keyword
    let open = rest.find('{').ok_or(malformed("expected '{'"))?;
    let count_token = rest[..open].trim();
    let count: usize = count_token.parse().map_err(|_| ParseError::BadValue {
        token: count_token.to_string(),
    })?;

    let body_and_tail = &rest[open + 1..];
    let close = body_and_tail.rfind('}').ok_or(ParseError::UnbalancedBraces)?;
    if !body_and_tail[close + 1..].trim().is_empty() {
        return Err(malformed("trailing input after '}'"));
    }
    let body = &body_and_tail[..close];

    let mut unrolled = Vec::new();
    for command in split_commands(body)? {
        unrolled.extend(parse_with_depth(&command, depth + 1)?);
    }
    let mut instructions = Vec::with_capacity(unrolled.len() * count);
    for _ in 0..count {
        instructions.extend(unrolled.iter().cloned());
    }
    Ok(instructions)
}

fn parse_address(token: &str) -> Result<usize, ParseError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .ok_or_else(|| ParseError::BadAddress {
            token: token.to_string(),
        })?;
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::BadAddress {
        token: token.to_string(),
    })
}
