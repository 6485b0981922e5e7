//! Interactive shell
//!
//! A line-oriented REPL over the emulator's command surface. The shell owns
//! stdout; the core only ever prints the segmentation-fault notice. Every
//! command except `initialize` and `exit` requires a prior successful
//! `initialize`.

mod commands;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use crate::{
    error::{EmulatorError, SchedError},
    system::System,
};

use commands::Action;

/// Shell session state.
pub struct Shell {
    config_path: PathBuf,
    system: Option<Arc<System>>,
}

impl Shell {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            system: None,
        }
    }

    /// Run the REPL until `exit` or end of input. Returns the process exit code.
    pub fn run(&mut self) -> i32 {
        println!("Welcome to the CSOPESY emulator. Type 'initialize' to begin, 'exit' to quit.");
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("root:\\> ");
            let _ = io::stdout().flush();

            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break, // EOF: same as exit
                Ok(_) => {}
            }

            match commands::dispatch(self, line.trim()) {
                Action::Continue => {}
                Action::Print(output) => println!("{output}"),
                Action::Exit => break,
            }
        }

        if let Some(system) = self.system.take() {
            println!("Shutting down...");
            system.shutdown();
        }
        0
    }

    pub(crate) fn system(&self) -> Option<&Arc<System>> {
        self.system.as_ref()
    }

    /// The running system, or `NotRunning` before a successful `initialize`.
    pub(crate) fn require_system(&self) -> Result<&Arc<System>, EmulatorError> {
        self.system
            .as_ref()
            .ok_or_else(|| SchedError::NotRunning.into())
    }

    pub(crate) fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub(crate) fn install(&mut self, system: Arc<System>) {
        self.system = Some(system);
    }
}
