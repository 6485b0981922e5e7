//! Error types for the emulator
//!
//! Faults that are part of normal execution (page fault, segmentation fault)
//! are not errors; they travel as [`crate::mm::MemAccess`] outcomes. The types
//! here cover configuration rejection, invalid submissions, and the fatal
//! paging conditions that abort the emulator.

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Configuration file rejection. Surfaced at `initialize`; nothing is
/// constructed when any of these fire.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("missing configuration key '{key}'")]
    MissingKey { key: &'static str },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Memory-manager errors
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Requested allocation is not a power of two in `[64, 65536]`.
    #[error("invalid memory size: {requested} bytes")]
    InvalidSize { requested: usize },

    /// Every frame is held by a blocked process and none can be evicted.
    /// Fatal; the emulator aborts with a diagnostic.
    #[error("no evictable page: all frame holders are blocked")]
    NoEvictable,

    /// Backing-store I/O failed. Fatal; there is no recovery path.
    #[error("backing store I/O failed: {0}")]
    BackingStore(#[from] std::io::Error),
}

/// Scheduler-side submission errors
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("system not initialized: use the 'initialize' command before using other commands")]
    NotRunning,

    #[error("process name '{name}' already exists")]
    DuplicateName { name: String },

    #[error("program has {count} commands, expected 1..=50")]
    ProgramTooLarge { count: usize },

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Mini-language parse rejection
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{token}'")]
    UnknownCommand { token: String },

    #[error("malformed {command}: {detail}")]
    MalformedCommand {
        command: &'static str,
        detail: &'static str,
    },

    #[error("bad address '{token}': expected 0x-prefixed hexadecimal")]
    BadAddress { token: String },

    #[error("bad value '{token}': expected decimal in 0..=65535")]
    BadValue { token: String },

    #[error("FOR nesting exceeds depth 3")]
    NestingTooDeep,

    #[error("unbalanced braces in FOR body")]
    UnbalancedBraces,

    #[error("empty program")]
    EmptyProgram,
}
