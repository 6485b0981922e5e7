//! Shell command dispatch
//!
//! Maps one input line to one action. All heavy lifting happens in
//! [`System`]; this module parses arguments and renders error messages.

use std::path::Path;

use crate::{config::Config, exec, system::System};

use super::Shell;

/// What the REPL should do after a command.
pub enum Action {
    Continue,
    Print(String),
    Exit,
}

/// Handle one input line.
pub fn dispatch(shell: &mut Shell, line: &str) -> Action {
    if line.is_empty() {
        return Action::Print("No input provided".into());
    }
    let tokens = tokenize(line);

    match tokens[0].as_str() {
        "exit" => Action::Exit,
        "initialize" => initialize(shell),
        "screen" => screen(shell, line, &tokens),
        "scheduler-start" => with_system(shell, |system| {
            system.start_generator();
            "Started the process generator.".into()
        }),
        "scheduler-stop" => with_system(shell, |system| {
            system.stop_generator();
            "Stopped the process generator.".into()
        }),
        "vmstat" => with_system(shell, |system| system.vmstat_report()),
        "process-smi" => with_system(shell, |system| system.smi_report()),
        "report-util" => with_system(shell, |system| {
            let path = Path::new(crate::system::REPORT_FILE);
            match system.append_report(path) {
                Ok(()) => format!("Report written to {}", path.display()),
                Err(err) => format!("Unable to write {}: {err}", path.display()),
            }
        }),
        other => Action::Print(format!("Unknown command: {other}")),
    }
}

fn initialize(shell: &mut Shell) -> Action {
    if shell.system().is_some() {
        return Action::Print("Already initialized.".into());
    }
    let config = match Config::load(shell.config_path()) {
        Ok(config) => config,
        Err(err) => return Action::Print(format!("Initialization failed: {err}")),
    };
    let scheduler = config.scheduler;
    match System::initialize(config) {
        Ok(system) => {
            shell.install(system);
            Action::Print(format!(
                "Initialization finished. Running the '{scheduler}' scheduler."
            ))
        }
        Err(err) => Action::Print(format!("Initialization failed: {err}")),
    }
}

fn screen(shell: &Shell, line: &str, tokens: &[String]) -> Action {
    let system = match shell.require_system() {
        Ok(system) => system,
        Err(err) => return Action::Print(err.to_string()),
    };
    match tokens.get(1).map(String::as_str) {
        Some("-s") => {
            let (Some(name), Some(size)) = (tokens.get(2), tokens.get(3)) else {
                return Action::Print("Usage: screen -s NAME SIZE".into());
            };
            submit(system, name, size, None)
        }
        Some("-c") => {
            // The program is the raw remainder of the line so quoted PRINT
            // literals survive; only the outer quotes are removed.
            let (Some(name), Some(size), Some(program)) =
                (tokens.get(2), tokens.get(3), rest_after_tokens(line, 4))
            else {
                return Action::Print("Usage: screen -c NAME SIZE \"cmd1; cmd2; ...\"".into());
            };
            let program = program
                .strip_prefix('"')
                .and_then(|p| p.strip_suffix('"'))
                .unwrap_or(program);
            let instructions = match exec::parse_user_program(program) {
                Ok(instructions) => instructions,
                Err(err) => return Action::Print(format!("Invalid program: {err}")),
            };
            submit(system, name, size, Some(instructions))
        }
        Some("-r") => {
            let Some(name) = tokens.get(2) else {
                return Action::Print("Usage: screen -r NAME".into());
            };
            match system.process_report(name) {
                Some(report) => Action::Print(report),
                None => Action::Print(format!("Process {name} not found.")),
            }
        }
        Some("-ls") => Action::Print(system.screen_list()),
        _ => Action::Print("Invalid 'screen' command syntax.".into()),
    }
}

fn submit(
    system: &System,
    name: &str,
    size: &str,
    commands: Option<Vec<exec::Instruction>>,
) -> Action {
    let Ok(size_bytes) = size.parse::<usize>() else {
        return Action::Print(format!("Invalid memory size: {size}"));
    };
    match system.submit_process(name, size_bytes, commands) {
        Ok(()) => Action::Print(format!("Request to create process '{name}' submitted.")),
        Err(err) => Action::Print(format!("{err}")),
    }
}

fn with_system(shell: &Shell, f: impl FnOnce(&System) -> String) -> Action {
    match shell.require_system() {
        Ok(system) => Action::Print(f(system)),
        Err(err) => Action::Print(err.to_string()),
    }
}

/// Split a line into whitespace-separated tokens.
fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// The raw remainder of `line` after its first `n` whitespace-separated
/// tokens; `None` when the line has no content past them.
fn rest_after_tokens(line: &str, n: usize) -> Option<&str> {
    let mut count = 0;
    let mut in_token = false;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if in_token {
                count += 1;
                in_token = false;
            }
        } else if !in_token {
            if count == n {
                return Some(line[i..].trim_end());
            }
            in_token = true;
        }
    }
    None
}
