//! CSOPESY emulator binary
//!
//! Starts the interactive shell; everything else happens behind the
//! `initialize` command.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use csopesy_emulator::{logger, shell::Shell};

#[derive(Parser)]
#[command(name = "csopesy", about = "Educational OS emulator", version)]
struct Args {
    /// Path to the configuration file read by `initialize`.
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,

    /// Log verbosity on stderr.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() {
    let args = Args::parse();
    logger::init(args.log_level);

    let code = Shell::new(args.config).run();
    std::process::exit(code);
}
